//! Routes one parsed [`Request`] through the [`Orchestrator`] and produces
//! the [`Response`](s) to write back, plus whether the connection should
//! close after this request (`QUIT`, or an unrecoverable backend error).
//!
//! Knows nothing about which wire codec produced the request or will
//! serialize the response — that's `server.rs`'s job. This mirrors the
//! teacher's split between `session/listener.rs` (I/O loop) and the
//! handshake/dispatch logic it calls into.

use chunkcache_core::model::{Item, Request, Response, StoreOp};
use chunkcache_core::wire::opcode;
use chunkcache_engine::chunking::{ChunkDeleteResult, ChunkGetResult, ChunkSetResult, ChunkTouchResult};
use chunkcache_engine::metrics::Metrics;
use chunkcache_engine::orchestrator::Orchestrator;

pub struct DispatchOutcome {
    pub responses: Vec<Response>,
    pub close: bool,
}

impl DispatchOutcome {
    fn one(resp: Response) -> Self {
        Self { responses: vec![resp], close: false }
    }

    fn none() -> Self {
        Self { responses: vec![], close: false }
    }
}

/// Binary opcode that would have produced `req`, and its opaque id —
/// needed by the binary codec's `write_response`, which frames every reply
/// against the opcode/opaque of the request it answers.
pub fn binary_opcode_and_opaque(req: &Request) -> (u8, u32) {
    match req {
        Request::Store { op, opaque, .. } => {
            let op_code = match op {
                StoreOp::Set => opcode::SET,
                StoreOp::Add => opcode::ADD,
                StoreOp::Replace => opcode::REPLACE,
            };
            (op_code, *opaque)
        }
        Request::Get { opaque, .. } => (opcode::GET, *opaque),
        Request::Gat { opaque, .. } => (opcode::GAT, *opaque),
        Request::Delete { opaque, .. } => (opcode::DELETE, *opaque),
        Request::Touch { opaque, .. } => (opcode::TOUCH, *opaque),
        Request::Quit { opaque } => (opcode::QUIT, *opaque),
        Request::Version { opaque } => (opcode::VERSION, *opaque),
        Request::Noop { opaque } => (opcode::NOOP, *opaque),
    }
}

pub async fn dispatch(req: &Request, orchestrator: &Orchestrator, metrics: &Metrics) -> DispatchOutcome {
    use std::sync::atomic::Ordering::Relaxed;

    match req {
        Request::Store { op, key, flags, exptime, value, quiet, .. } => {
            metrics.requests_set.fetch_add(1, Relaxed);
            metrics.bytes_in.fetch_add(value.len() as u64, Relaxed);

            // §4.C only specifies the SET algorithm; ADD/REPLACE share its
            // wire shape but this proxy does not implement their
            // conditional (absent/present) backend semantics -- the
            // underlying BackendHandler::set is unconditional. Recorded in
            // DESIGN.md.
            let _ = op;

            match orchestrator.set(key, *flags, *exptime, value).await {
                Ok(ChunkSetResult::Stored) => {
                    if *quiet {
                        DispatchOutcome::none()
                    } else {
                        DispatchOutcome::one(Response::Stored)
                    }
                }
                Ok(ChunkSetResult::NotStored) => {
                    if *quiet {
                        DispatchOutcome::none()
                    } else {
                        DispatchOutcome::one(Response::NotStored)
                    }
                }
                Ok(ChunkSetResult::Exists) => {
                    if *quiet {
                        DispatchOutcome::none()
                    } else {
                        DispatchOutcome::one(Response::Exists)
                    }
                }
                Err(err) => backend_error(metrics, err),
            }
        }

        Request::Get { keys, quiet, .. } => {
            metrics.requests_get.fetch_add(1, Relaxed);
            let mut responses = Vec::with_capacity(keys.len() + 1);
            for key in keys {
                match orchestrator.get(key).await {
                    Ok(ChunkGetResult::Hit { flags, value }) => {
                        metrics.bytes_out.fetch_add(value.len() as u64, Relaxed);
                        responses.push(Response::Value(Item { key: key.clone(), flags, value }));
                    }
                    Ok(ChunkGetResult::Miss) => {}
                    Err(err) => return backend_error(metrics, err),
                }
            }
            // A quiet GETQ/GETKQ that missed gets no reply at all -- not even
            // the terminator -- so a pipelined client never sees it.
            if *quiet && responses.is_empty() {
                DispatchOutcome::none()
            } else {
                responses.push(Response::End);
                DispatchOutcome { responses, close: false }
            }
        }

        Request::Gat { keys, exptime, .. } => {
            metrics.requests_gat.fetch_add(1, Relaxed);
            let mut responses = Vec::with_capacity(keys.len() + 1);
            for key in keys {
                match orchestrator.gat(key, *exptime).await {
                    Ok(ChunkGetResult::Hit { flags, value }) => {
                        metrics.bytes_out.fetch_add(value.len() as u64, Relaxed);
                        responses.push(Response::Value(Item { key: key.clone(), flags, value }));
                    }
                    Ok(ChunkGetResult::Miss) => {}
                    Err(err) => return backend_error(metrics, err),
                }
            }
            responses.push(Response::End);
            DispatchOutcome { responses, close: false }
        }

        Request::Delete { key, quiet, .. } => {
            metrics.requests_delete.fetch_add(1, Relaxed);
            match orchestrator.delete(key).await {
                Ok(ChunkDeleteResult::Deleted) if *quiet => DispatchOutcome::none(),
                Ok(ChunkDeleteResult::Deleted) => DispatchOutcome::one(Response::Deleted),
                Ok(ChunkDeleteResult::NotFound) if *quiet => DispatchOutcome::none(),
                Ok(ChunkDeleteResult::NotFound) => DispatchOutcome::one(Response::NotFound),
                Err(err) => backend_error(metrics, err),
            }
        }

        Request::Touch { key, exptime, quiet, .. } => {
            metrics.requests_touch.fetch_add(1, Relaxed);
            match orchestrator.touch(key, *exptime).await {
                Ok(ChunkTouchResult::Touched) if *quiet => DispatchOutcome::none(),
                Ok(ChunkTouchResult::Touched) => DispatchOutcome::one(Response::Touched),
                Ok(ChunkTouchResult::NotFound) if *quiet => DispatchOutcome::none(),
                Ok(ChunkTouchResult::NotFound) => DispatchOutcome::one(Response::NotFound),
                Err(err) => backend_error(metrics, err),
            }
        }

        Request::Quit { .. } => DispatchOutcome { responses: vec![], close: true },

        Request::Version { .. } => {
            DispatchOutcome::one(Response::Version(env!("CARGO_PKG_VERSION").to_string()))
        }

        Request::Noop { .. } => DispatchOutcome::one(Response::Ok),
    }
}

fn backend_error(metrics: &Metrics, err: chunkcache_engine::chunking::ChunkingError) -> DispatchOutcome {
    metrics.l2_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    tracing::warn!(error = %err, "backend I/O error serving request");
    // §7 BackendIO: report SERVER_ERROR for this request and close the
    // connection -- this dispatcher doesn't know which specific tier
    // failed, and a chunking engine can't tell a desynchronized stream
    // apart from a clean one, so the safe choice is to stop reusing it.
    DispatchOutcome { responses: vec![Response::ServerError("backend unavailable".into())], close: true }
}
