// crates/mcs-gateway/src/dispatch/tests.rs
// ============================================================================
// Module: Dispatch Engine Tests
// Description: Chunk numbering, fault handling, and cancellation.
// ============================================================================

//! ## Overview
//! Exercises chunk numbering, in-band errors, panic containment, and sink
//! closure in the dispatch engine.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use mcs_core::ChunkContent;
use mcs_core::ImagePayload;
use mcs_core::NativeToolSource;
use mcs_core::OutputItem;
use mcs_core::ToolArguments;
use mcs_core::ToolCallChunk;
use mcs_core::ToolFault;
use mcs_core::tool;
use proptest::prelude::*;
use serde_json::json;

use super::CallOutcome;
use super::ChunkSink;
use super::DispatchEngine;
use super::DispatchError;
use super::SinkClosed;
use crate::audit::NoopAuditSink;
use crate::registry::ToolRegistryBuilder;

/// Engine over a registry holding `tools`.
fn engine(tools: Vec<NativeToolSource>) -> DispatchEngine {
    let mut builder = ToolRegistryBuilder::new(Arc::new(NoopAuditSink));
    for tool in tools {
        builder.register_native(tool);
    }
    DispatchEngine::new(Arc::new(builder.build()))
}

/// Tool yielding `count` text items, then an optional fault.
fn counted(count: usize, fault: bool) -> NativeToolSource {
    NativeToolSource::new("counted", "Counts", move |_args| {
        let items = (0..count).map(|index| Ok(OutputItem::Text(format!("item {index}"))));
        let tail = fault.then(|| Err(ToolFault::runtime("stopped")));
        Box::new(items.chain(tail).collect::<Vec<_>>().into_iter())
    })
}

/// Sink that accepts `capacity` chunks and then reports closure.
struct ClosingSink {
    /// Chunks accepted before closing.
    capacity: usize,
    /// Chunks received so far.
    received: Vec<ToolCallChunk>,
}

impl ChunkSink for ClosingSink {
    fn emit(&mut self, chunk: ToolCallChunk) -> Result<(), SinkClosed> {
        if self.received.len() == self.capacity {
            return Err(SinkClosed);
        }
        self.received.push(chunk);
        Ok(())
    }
}

proptest! {
    /// Confirms sequence ids start at zero and never skip, faults included.
    #[test]
    fn sequence_ids_are_gapless(count in 0usize..48, fault in any::<bool>()) {
        let engine = engine(vec![counted(count, fault)]);
        let mut chunks = Vec::new();
        let outcome = engine.call("counted", ToolArguments::new(), &mut chunks).unwrap();

        let ids: Vec<u64> = chunks.iter().map(|chunk| chunk.sequence_id).collect();
        let expected: Vec<u64> = (0..chunks.len() as u64).collect();
        prop_assert_eq!(ids, expected);
        prop_assert_eq!(outcome.chunks(), chunks.len() as u64);
        let errors = chunks.iter().filter(|chunk| chunk.is_error()).count();
        if fault {
            prop_assert_eq!(chunks.len(), count + 1);
            prop_assert_eq!(errors, 1);
            prop_assert!(chunks.last().unwrap().is_error());
            prop_assert_eq!(outcome.state(), "failed");
        } else {
            prop_assert_eq!(chunks.len(), count);
            prop_assert_eq!(errors, 0);
            prop_assert_eq!(outcome.state(), "completed");
        }
    }
}

/// Confirms an unknown tool emits no chunks.
#[test]
fn unknown_tool_emits_nothing() {
    let engine = engine(vec![counted(3, false)]);
    let mut chunks = Vec::new();
    let err = engine.call("missing", ToolArguments::new(), &mut chunks).unwrap_err();
    assert_eq!(err, DispatchError::NotFound("missing".to_string()));
    assert!(chunks.is_empty());
}

/// Confirms `ListTools` returns definitions sorted by name.
#[test]
fn list_tools_returns_sorted_definitions() {
    let engine = engine(vec![
        NativeToolSource::new("beta", "B", |_args| tool::single(OutputItem::text("b"))),
        NativeToolSource::new("alpha", "A", |_args| tool::single(OutputItem::text("a"))),
    ]);
    let names: Vec<_> = engine.list_tools().tools.into_iter().map(|def| def.name).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
}

/// Confirms each output item maps to its chunk variant.
#[test]
fn items_map_to_chunk_variants() {
    let engine = engine(vec![NativeToolSource::new("mixed", "Mixed", |_args| {
        tool::from_items(vec![
            OutputItem::text("hello"),
            OutputItem::binary(vec![0x89, 0x50], "image/png"),
            OutputItem::Structured(json!({"b": 1, "a": [true, null]})),
        ])
    })]);
    let mut chunks = Vec::new();
    let outcome = engine.call("mixed", ToolArguments::new(), &mut chunks).unwrap();
    assert_eq!(
        outcome,
        CallOutcome::Completed {
            chunks: 3
        }
    );
    assert_eq!(chunks[0].content, ChunkContent::Text("hello".to_string()));
    assert_eq!(
        chunks[1].content,
        ChunkContent::Image(ImagePayload {
            data: vec![0x89, 0x50],
            mime_type: "image/png".to_string(),
        })
    );
    assert_eq!(chunks[2].content, ChunkContent::Text(r#"{"a":[true,null],"b":1}"#.to_string()));
}

/// Confirms a late fault keeps the chunks emitted before it.
#[test]
fn fault_after_output_keeps_partial_chunks() {
    let engine = engine(vec![counted(2, true)]);
    let mut chunks = Vec::new();
    let outcome = engine.call("counted", ToolArguments::new(), &mut chunks).unwrap();
    assert_eq!(outcome.error_message(), Some("stopped"));
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[2].sequence_id, 2);
    assert_eq!(chunks[2].content, ChunkContent::Error("stopped".to_string()));
}

/// Confirms invalid arguments are reported in band.
#[test]
fn invalid_argument_is_in_band() {
    let engine = engine(vec![NativeToolSource::new("needs_path", "Path", |args| {
        match args.required_str("path") {
            Ok(path) => tool::single(OutputItem::text(path.to_string())),
            Err(fault) => tool::failed(fault),
        }
    })]);
    let mut chunks = Vec::new();
    let outcome = engine.call("needs_path", ToolArguments::new(), &mut chunks).unwrap();
    assert_eq!(outcome.state(), "failed");
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].is_error());
}

/// Confirms a panic while producing becomes an error chunk.
#[test]
fn panic_while_producing_becomes_error_chunk() {
    let engine = engine(vec![NativeToolSource::new("panicky", "Panics", |_args| {
        let mut produced = 0;
        Box::new(std::iter::from_fn(move || {
            produced += 1;
            assert!(produced < 2, "boom");
            Some(Ok(OutputItem::text("ok")))
        }))
    })]);
    let mut chunks = Vec::new();
    let outcome = engine.call("panicky", ToolArguments::new(), &mut chunks).unwrap();
    assert_eq!(outcome.chunks(), 2);
    assert_eq!(chunks[1].content, ChunkContent::Error("internal tool error: boom".to_string()));
}

/// Confirms a panic during invoke becomes an error chunk.
#[test]
fn panic_during_invoke_becomes_error_chunk() {
    let engine = engine(vec![NativeToolSource::new("broken", "Broken", |_args| {
        panic!("cannot start")
    })]);
    let mut chunks = Vec::new();
    let outcome = engine.call("broken", ToolArguments::new(), &mut chunks).unwrap();
    assert_eq!(outcome.state(), "failed");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].sequence_id, 0);
}

/// Confirms a closed sink stops consumption.
#[test]
fn closed_sink_stops_consumption() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pulled);
    let engine = engine(vec![NativeToolSource::new("endless", "Endless", move |_args| {
        let counter = Arc::clone(&counter);
        Box::new(std::iter::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Ok(OutputItem::text("tick")))
        }))
    })]);
    let mut sink = ClosingSink {
        capacity: 2,
        received: Vec::new(),
    };
    let outcome = engine.call("endless", ToolArguments::new(), &mut sink).unwrap();
    assert_eq!(
        outcome,
        CallOutcome::Cancelled {
            chunks: 2
        }
    );
    assert_eq!(sink.received.len(), 2);
    assert_eq!(pulled.load(Ordering::SeqCst), 3);
}
