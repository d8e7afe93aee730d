//! The loader thread: reads raw asset bytes from disk ahead of the consumer, one package at a time.
//!
//! The queue is walked in runs of consecutive positions sharing a package.  For each run, the package's directory is
//! scanned in on-disk order so that every package file is read front to back exactly once, whatever order the consumer
//! wants the assets in.
use std::sync::Arc;

use crate::decoder_worker::DecodeJob;
use crate::sharing::Shared;
use crate::state::{CacheEntry, Payload, Stamp};
use crate::store::read_asset;
use crate::*;

/// Bytes read but not yet visible in the cache.
struct Staged {
    checksum: Checksum,
    kind: AssetKind,
    bytes: Arc<[u8]>,
    stamp: Stamp,
}

/// Completes a queue when dropped, so the downstream worker gets released even if this thread unwinds.
struct CompleteOnDrop<'a, T>(&'a BlockingQueue<T>);

impl<T> Drop for CompleteOnDrop<'_, T> {
    fn drop(&mut self) {
        self.0.set_completed();
    }
}

/// Last position of the run starting at `first`.
fn run_end(queue: &[AssetRef], first: usize) -> usize {
    let package = &queue[first].package;
    let mut last = first;
    while last + 1 < queue.len() && queue[last + 1].is_same_package(package) {
        last += 1;
    }
    last
}

impl<S: PackageStore, D: Decoder> Shared<S, D> {
    pub(crate) fn run_loader(&self, queue: &[AssetRef]) {
        let _complete = CompleteOnDrop(&self.jobs);
        let mut first = 0;

        while first < queue.len() {
            let last = run_end(queue, first);
            if let Err(e) = self.load_run(queue, first, last) {
                log::warn!(
                    "Prefetching package {} failed: {}",
                    queue[first].package.name(),
                    e
                );
            }

            // Lets the decoder vouch for the run even if nothing in it needed decoding.
            self.jobs.enqueue(DecodeJob::EndOfRun { last });
            first = last + 1;

            if self.state.lock().closed {
                log::debug!("Loader stopping early at position {}", first);
                break;
            }
        }
    }

    /// Prefetch everything the run `[first, last]` needs from its package.
    fn load_run(
        &self,
        queue: &[AssetRef],
        first: usize,
        last: usize,
    ) -> Result<(), SharingError<D::Error>> {
        let config = &self.config;
        let package = &queue[first].package;
        let mut pending: Vec<Arc<Asset>> = vec![];
        // Next queue position not known to be in the cache.
        let mut index = first;

        let can_load = {
            let mut state = self.state.lock();
            state.loader_position = first;
            state.prune(config);
            let material_limit = config
                .max_materials
                .min(config.max_entries.saturating_sub(state.entries.len()));
            let mut materials = 0;

            for asset in package.assets() {
                if !asset.kind.is_supported() || state.pools.is_promoted(asset.kind, &asset.checksum) {
                    continue;
                }

                // Some packages carry hundreds of materials, usually by mistake.
                if asset.kind == AssetKind::Material {
                    materials += 1;
                    if materials > material_limit {
                        continue;
                    }
                }

                if let Some(entry) = state.entries.get_mut(&asset.checksum) {
                    entry.stamp.position = last;
                    state.entries.reinsert(&asset.checksum);
                    if index < last && queue[index].is_asset(asset) {
                        index += 1;
                    }
                } else {
                    pending.push(asset.clone());
                }
            }

            state.can_admit(config)
        };

        if pending.is_empty() {
            return Ok(());
        }

        let mut reader = self
            .store
            .open(package)
            .map_err(|e| SharingError::<D::Error>::io(package, e))?;
        if !can_load && !self.wait_for_admission() {
            return Ok(());
        }

        let mut staged = Vec::with_capacity(pending.len());
        let mut ready = index;

        for asset in &pending {
            let bytes: Arc<[u8]> =
                read_asset::<_, D::Error>(&mut reader, package, asset, config.max_asset_size)?
                    .into();
            let stamp = Stamp {
                cost: config.cost_of(asset),
                position: last,
            };

            if asset.kind.is_decodable() {
                self.jobs.enqueue(DecodeJob::Payload {
                    package: package.clone(),
                    asset: asset.clone(),
                    bytes: bytes.clone(),
                    ready,
                    last,
                });
            }

            staged.push(Staged {
                checksum: asset.checksum.clone(),
                kind: asset.kind,
                bytes,
                stamp,
            });

            if asset.kind == AssetKind::Object && index < last && queue[index].is_asset(asset) {
                let d = index - first;
                // Publish often at the start of a run, then every fourth position.
                if d < 3 || d % 4 == 0 {
                    self.flush(&mut staged);
                    ready = index + 1;
                }
                index += 1;
            }
        }

        self.flush(&mut staged);
        log::debug!(
            "Prefetched {} assets from {} for positions {}..={}",
            pending.len(),
            package.name(),
            first,
            last
        );
        Ok(())
    }

    /// Block until admission control lets the loader continue.  Returns false if the cache was closed instead.
    fn wait_for_admission(&self) -> bool {
        let mut state = self.state.lock();
        while !state.closed && !state.can_admit(&self.config) {
            self.admitted.wait(&mut state);
        }
        !state.closed
    }

    /// Make staged bytes visible in the cache and account for their cost.
    fn flush(&self, staged: &mut Vec<Staged>) {
        if staged.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        for s in staged.drain(..) {
            // The decoder or the consumer may have got there first.
            if state.pools.is_promoted(s.kind, &s.checksum) {
                continue;
            }
            state.insert_new(
                s.checksum,
                CacheEntry {
                    payload: Payload::Bytes(s.bytes),
                    stamp: s.stamp,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_end() {
        let a = Package::new("a", "a", 1, vec![Asset::new("x", "1", AssetKind::Object, 0, 1)]);
        let b = Package::new("b", "b", 1, vec![Asset::new("y", "2", AssetKind::Object, 0, 1)]);
        let r = |p: &Arc<Package>| AssetRef::new(p.clone(), p.assets()[0].clone());
        let queue = vec![r(&a), r(&a), r(&b), r(&a), r(&a), r(&a)];

        assert_eq!(run_end(&queue, 0), 1);
        assert_eq!(run_end(&queue, 2), 2);
        assert_eq!(run_end(&queue, 3), 5);
        assert_eq!(run_end(&queue, 5), 5);
    }
}
