// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Domain types shared by the capture and replay sides of Session Replay
//!
//! The observed surface is modelled as a generic node tree (tag, attributes,
//! ordered children, optional text) so that any tree-capable rendering target
//! can stand in for the original page. Events, chunks and session records are
//! the wire vocabulary exchanged with the ingestion and retrieval boundaries.

pub mod canvas;
pub mod chunk;
pub mod event;
pub mod markup;
pub mod node;
pub mod retrieval;
pub mod session;

pub use canvas::{check_dimensions, Bitmap, BitmapError, MAX_DIMENSION, MAX_PIXELS};
pub use chunk::{ChunkFingerprint, ChunkSubmission, SubmitOutcome, SubmitReceipt, fingerprint};
pub use event::{
    CanvasCapture, DomSnapshot, Event, EventPayload, EventType, InitialState, InputChange,
    InteractiveElement, MutationBatch, MutationRecord, PointerButton, PointerPosition, ScrollPosition,
    SessionEnd, SessionStart, Size, Visibility,
};
pub use markup::{MarkupError, ParsedDocument, parse_document, to_markup};
pub use node::{DomId, FRAGMENT_TAG, MARKER_ATTRIBUTE, Node, TEXT_TAG};
pub use retrieval::{RetrievalError, SessionSource};
pub use session::{ChunkRecord, SessionRecord, SessionUpsert};
