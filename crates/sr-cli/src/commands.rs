// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use crate::{CliConfig, ReplayArgs, ServeArgs};
use anyhow::{ensure, Context};
use sr_domain_types::EventType;
use sr_ingest::{IngestConfig, IngestServer, SqliteStore};
use sr_logging::redact;
use sr_replay::{
    describe, DriverExit, Frame, PlaybackCommand, PlaybackDriver, PlaybackScheduler,
    ReconstructionEngine, Renderer, ReplayConfig, SessionExport, Timeline,
};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Run the ingest server until Ctrl-C
pub async fn serve(mut config: CliConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.ingest.bind_addr = bind;
    }
    if let Some(database) = args.database {
        config.ingest.database_path = database;
    }
    log_credentials(&config.ingest);

    let addr = config.ingest.bind_addr;
    let server = IngestServer::new(config.ingest.clone())
        .with_context(|| format!("failed to open store {}", config.ingest.database_path))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    server
        .serve(listener, async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
        })
        .await
        .context("ingest server failed")
}

fn log_credentials(config: &IngestConfig) {
    if config.credentials.is_empty() {
        warn!("no credentials configured, every chunk submission will be rejected");
    }
    for (credential, host) in &config.credentials {
        info!(credential = %redact(credential), %host, "credential configured");
    }
    if let Some(token) = &config.admin_token {
        info!(token = %redact(token), "admin token required on read endpoints");
    }
}

/// Session metadata and per-type event counts
pub fn inspect(export: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let export = read_export(export)?;
    let chunks = export.chunks.len();
    let timeline = Timeline::from(export);
    let session = timeline.session();

    writeln!(out, "session   {}", session.id)?;
    writeln!(out, "url       {}", session.url.as_deref().unwrap_or("-"))?;
    if let Some(viewport) = session.viewport {
        writeln!(out, "viewport  {}x{}", viewport.width, viewport.height)?;
    }
    if let Some(agent) = &session.user_agent {
        writeln!(out, "agent     {agent}")?;
    }
    writeln!(out, "chunks    {chunks}")?;
    writeln!(out, "events    {}", timeline.events().len())?;
    writeln!(out, "duration  {} ms", timeline.duration())?;

    let mut counts: BTreeMap<EventType, usize> = BTreeMap::new();
    for event in timeline.events() {
        *counts.entry(event.event_type()).or_default() += 1;
    }
    for (event_type, count) in counts {
        writeln!(out, "  {:<18} {count}", event_type.as_ref())?;
    }
    Ok(())
}

/// Render the frame reconstructed at `at`
pub fn seek(
    export: &Path,
    at: u64,
    config: ReplayConfig,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let timeline = Arc::new(Timeline::from(read_export(export)?));
    if at > timeline.duration() {
        warn!(at, duration = timeline.duration(), "seek past the end of the session");
    }
    let mut engine = ReconstructionEngine::new(timeline, config);
    let frame = engine.seek(at);
    out.write_all(describe(&frame, true).as_bytes())?;
    Ok(())
}

/// Play through the driver until the session ends or Ctrl-C
pub async fn play<W: Write>(
    export: &Path,
    config: ReplayConfig,
    every_tree: bool,
    out: W,
) -> anyhow::Result<DriverExit> {
    let timeline = Arc::new(Timeline::from(read_export(export)?));
    let scheduler = PlaybackScheduler::new(timeline, config).context("invalid replay settings")?;
    let renderer = OutlineOnChange {
        out,
        every_tree,
        last_baseline: None,
        rendered: false,
    };
    let (mut driver, commands) = PlaybackDriver::new(scheduler, renderer);

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = commands.send(PlaybackCommand::Stop).await;
        }
    });
    let exit = driver.run().await;
    interrupt.abort();

    let exit = exit.context("playback failed")?;
    info!(?exit, "playback finished");
    Ok(exit)
}

/// Copy one session out of a store database
pub fn export(db: &Path, session_id: &str, out: &Path) -> anyhow::Result<usize> {
    ensure!(db.exists(), "database {} does not exist", db.display());
    let store =
        SqliteStore::open(db).with_context(|| format!("failed to open {}", db.display()))?;
    let export = SessionExport::fetch(&store, session_id)
        .with_context(|| format!("failed to load session {session_id}"))?;
    let events = export.chunks.iter().map(|chunk| chunk.events.len()).sum();
    export
        .write(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    info!(session_id, chunks = export.chunks.len(), events, out = %out.display(), "session exported");
    Ok(events)
}

/// Apply command-line overrides on top of the `[replay]` table
pub fn replay_config(base: &ReplayConfig, args: &ReplayArgs, speed: Option<f64>) -> ReplayConfig {
    let mut config = base.clone();
    if let Some(container) = args.container {
        config.container = container;
    }
    if let Some(scale) = args.scale {
        config = config.with_scale(scale);
    }
    if let Some(speed) = speed {
        config = config.with_speed(speed);
    }
    config
}

fn read_export(path: &Path) -> anyhow::Result<SessionExport> {
    SessionExport::read(path).with_context(|| format!("failed to load {}", path.display()))
}

/// Prints the outline only when the baseline snapshot changes
struct OutlineOnChange<W> {
    out: W,
    every_tree: bool,
    last_baseline: Option<u64>,
    rendered: bool,
}

impl<W: Write> Renderer for OutlineOnChange<W> {
    fn render(&mut self, frame: &Frame) -> io::Result<()> {
        let changed = !self.rendered || frame.baseline_at != self.last_baseline;
        self.rendered = true;
        self.last_baseline = frame.baseline_at;
        self.out
            .write_all(describe(frame, self.every_tree || changed).as_bytes())?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_domain_types::Size;

    #[test]
    fn overrides_replace_only_what_was_given() {
        let base = ReplayConfig::default().with_speed(2.0);
        let args = ReplayArgs {
            container: Some(Size::new(640, 480)),
            scale: None,
        };
        let config = replay_config(&base, &args, None);
        assert_eq!(config.container, Size::new(640, 480));
        assert_eq!(config.speed, 2.0);
        assert_eq!(config.scale, 1.0);

        assert_eq!(replay_config(&base, &ReplayArgs::default(), Some(4.0)).speed, 4.0);
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn credentials_are_logged_without_their_secret() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let mut config = IngestConfig::default();
        config.credentials.insert("site-key-123".into(), "app.example".into());
        config.admin_token = Some("admin-secret".into());
        tracing::subscriber::with_default(subscriber, || log_credentials(&config));

        let logs = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("app.example"), "{logs}");
        assert!(logs.contains("[REDACTED]"), "{logs}");
        assert!(!logs.contains("site-key-123"), "{logs}");
        assert!(!logs.contains("admin-secret"), "{logs}");
    }

    #[test]
    fn missing_database_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("absent.db");
        let err = export(&db, "s1", &dir.path().join("out.json")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(!db.exists());
    }
}
