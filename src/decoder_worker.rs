//! The decoder thread: unpacks textures and meshes off the consumer thread and tells the consumer how far it may go.
use std::sync::Arc;

use crate::sharing::Shared;
use crate::state::{Payload, Stamp};
use crate::*;

/// Work handed from the loader to the decoder.
pub(crate) enum DecodeJob {
    Payload {
        package: Arc<Package>,
        asset: Arc<Asset>,
        bytes: Arc<[u8]>,
        /// Positions below this were fully handed over before this payload.
        ready: usize,
        /// Last position of the run this payload was read for.
        last: usize,
    },
    /// Everything for the run ending at `last` has been handed over.
    EndOfRun { last: usize },
}

impl DecodeJob {
    fn ready(&self) -> usize {
        match self {
            DecodeJob::Payload { ready, .. } => *ready,
            DecodeJob::EndOfRun { last } => last + 1,
        }
    }
}

/// Announces that everything is ready when dropped, so the consumer is never left waiting on a dead decoder.
struct AllReadyOnDrop<'a>(&'a Handoff<usize>);

impl Drop for AllReadyOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set(usize::MAX);
    }
}

impl<S: PackageStore, D: Decoder> Shared<S, D> {
    pub(crate) fn run_decoder(&self) {
        let _all_ready = AllReadyOnDrop(&self.ready);
        let mut published = 0;

        while let Some(job) = self.jobs.dequeue() {
            // A payload belongs to a position at or after its hint, so the hint can go out before decoding it.
            let ready = job.ready();
            if ready > published {
                published = ready;
                self.ready.set(ready);
            }

            if let DecodeJob::Payload {
                package,
                asset,
                bytes,
                last,
                ..
            } = job
            {
                self.decode_one(&package, &asset, &bytes, last);
            }
        }
    }

    fn decode_one(&self, package: &Package, asset: &Asset, bytes: &[u8], last: usize) {
        let decoded = match asset.kind {
            AssetKind::Texture => self
                .decoder
                .decode_texture(package, bytes)
                .map(|t| Payload::Texture(Arc::new(t))),
            AssetKind::Mesh => self
                .decoder
                .decode_mesh(package, bytes)
                .map(|m| Payload::Mesh(Arc::new(m))),
            _ => return,
        };

        match decoded {
            Ok(payload) => {
                let stamp = Stamp {
                    cost: self.config.cost_of(asset),
                    position: last,
                };
                self.state.lock().store_decoded(asset, payload, stamp);
            }
            Err(e) => {
                // Leave nothing to build from; the consumer reports the failure when it loads the asset itself.
                if let Some(entry) = self.state.lock().entries.get_mut(&asset.checksum) {
                    entry.payload = Payload::Empty;
                }
                log::warn!(
                    "Decoding {} from {} failed: {}",
                    asset.name,
                    package.name(),
                    e
                );
            }
        }
    }
}
