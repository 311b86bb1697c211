//! Actor system for the durable work queue.
//!
//! This crate provides the Ractor-based actors that own a queue and run
//! its jobs.
//!
//! # Architecture
//!
//! - `QueueActor` - Owns one named queue persisted in SurrealDB and parks claimers
//! - `QueueHandle` - Cloneable client implementing [`WorkQueue`]
//! - `WorkerActor` - Claims and executes jobs, one at a time
//! - `WorkerPool` - A fixed number of workers sharing a queue
//!
//! # Usage
//!
//! ```ignore
//! use actors::{QueueOptions, WorkQueue, spawn_queue};
//!
//! let (queue, _handle) = spawn_queue(db, QueueOptions::new("userQueue")).await?;
//! let job = queue.enqueue("process_csv", payload).await?;
//! let claimed = queue.claim("worker-1", None).await?;
//! ```

mod handle;
mod handler;
mod messages;
mod pool;
mod queue;
mod queue_actor;
mod worker_actor;

pub use handle::{QueueHandle, spawn_queue};
pub use handler::{HandlerFuture, HandlerResult, JobHandler, JobHandlerRegistry};
pub use messages::{QueueMessage, WorkerMessage};
pub use pool::{WorkerPool, worker_id};
pub use queue::{QueueError, QueueFuture, WorkQueue};
pub use queue_actor::{QueueActor, QueueOptions};
pub use worker_actor::{WorkerActor, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
