//! A prefetching cache for streaming assets out of package files in a known order.
//!
//! Sometimes, you know ahead of time the exact order in which a long list of things will be loaded: a game loading a
//! city's worth of buildings, for instance, where every building pulls textures, meshes and materials out of some
//! package file, and many of those are shared between buildings.  Loading each one synchronously means seeking all over
//! the disk and decoding on the one thread that is also doing everything else.  This crate instead reads each package
//! front to back exactly once, ahead of the consumer, and unpacks what it can on a second thread:
//!
//! - A loader thread walks the queue a package at a time, reads every asset the package carries into the cache, and
//!   holds off when the cache gets too expensive relative to how far ahead of the consumer it is.
//! - A decoder thread turns textures and meshes into intermediate forms, and tells the consumer how far along the queue
//!   everything is ready.
//! - The consumer walks the queue, calling [SharingCache::await_position] and then retrieving what it needs.  Objects
//!   that get built are shared for the rest of the session if so configured.
//!
//! Retrieval always works, prefetched or not.  The pipeline only makes it faster.
//!
//! To use this crate, implement [PackageStore] (or use [FilesystemStore] or [MemoryStore]) and [Decoder], then
//! construct a [SharingCache] with your chosen [SharingConfig].
//!
//! The building blocks are exposed because they're useful on their own: [OrderedMap] is a hash map that remembers
//! insertion order without reordering on reads, [BlockingQueue] is a work queue with a completion signal, and
//! [Handoff] is a single-slot mailbox for publishing progress.
mod anomaly;
mod asset;
mod blocking_queue;
mod config;
mod decoder_worker;
mod error;
mod handoff;
mod loader;
mod metrics;
mod ordered_map;
mod sharing;
mod state;
mod store;
#[cfg(test)]
mod test_support;
mod traits;

pub use anomaly::*;
pub use asset::*;
pub use blocking_queue::*;
pub use config::*;
pub use error::*;
pub use handoff::*;
pub use metrics::MetricsSnapshot;
pub use ordered_map::*;
pub use sharing::{CacheStatus, SharingCache};
pub use store::{AssetStream, FilesystemStore, MemoryStore};
pub use traits::*;
