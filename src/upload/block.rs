//! Block planning and the round-based multipart upload engine

use bytes::Bytes;
use futures::future;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::UploadTarget;
use crate::retry::RetryPolicy;
use crate::transport::Transport;

/// Fixed block size for multipart transfers.
pub const BLOCK_SIZE: u64 = 32 * 1024 * 1024;

/// Workers dispatched per wave unless clamped by the block count.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound on concurrent block requests.
pub const MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

/// One contiguous byte range of the source file, uploaded as one part.
#[derive(Debug, Clone)]
pub struct BlockState {
    /// 1-based part number.
    pub index: u32,
    pub offset: u64,
    pub length: u64,
    pub attempts: u32,
    pub status: BlockStatus,
}

/// Compute the ordered block sequence covering the whole file.
///
/// Computed exactly once per session and never re-sliced. The last block
/// carries the remainder; when the file size is an exact multiple of the
/// block size it is a full block, never a zero-length trailer.
pub fn plan_blocks(file_size: u64, block_size: u64) -> Vec<BlockState> {
    if file_size == 0 || block_size == 0 {
        return Vec::new();
    }

    let count = (file_size + block_size - 1) / block_size;
    (0..count)
        .map(|i| {
            let offset = i * block_size;
            let length = if i + 1 == count {
                file_size - offset
            } else {
                block_size
            };
            BlockState {
                index: (i + 1) as u32,
                offset,
                length,
                attempts: 0,
                status: BlockStatus::Pending,
            }
        })
        .collect()
}

/// Transfers all blocks of a multipart upload with bounded concurrency and
/// per-round retry. A block already marked Succeeded is never re-dispatched.
pub struct BlockUploader<'a, T: Transport> {
    transport: &'a T,
    policy: RetryPolicy,
    concurrency: usize,
}

impl<'a, T: Transport> BlockUploader<'a, T> {
    pub fn new(transport: &'a T, policy: RetryPolicy, concurrency: usize) -> Self {
        Self {
            transport,
            policy,
            concurrency,
        }
    }

    /// Drive every block to Succeeded or exhaust the round budget.
    ///
    /// Rounds are synchronous barriers: each round re-dispatches the blocks
    /// still pending in waves of at most `concurrency` concurrent PUTs,
    /// reading block bytes in ascending offset order just before the wave
    /// that needs them, so at most one wave of buffers is held at once.
    /// Failed blocks requeue for the next round after an exponential
    /// backoff; the first block to exhaust the budget fails the whole
    /// upload with its last error.
    pub async fn run(
        &self,
        file: &mut File,
        file_path: &Path,
        target: &UploadTarget,
        blocks: &mut [BlockState],
    ) -> Result<()> {
        if blocks.is_empty() {
            return Ok(());
        }

        let upload_id = target
            .upload_id
            .as_deref()
            .ok_or_else(|| Error::Config("upload id missing for multipart upload".to_string()))?;

        let concurrency = self.concurrency.min(blocks.len()).max(1);
        let mut last_errors: Vec<Option<Error>> = blocks.iter().map(|_| None).collect();

        for round in 1..=self.policy.max_attempts {
            let pending: Vec<usize> = blocks
                .iter()
                .enumerate()
                .filter(|(_, b)| b.status != BlockStatus::Succeeded)
                .map(|(i, _)| i)
                .collect();
            if pending.is_empty() {
                return Ok(());
            }

            if round > 1 {
                tokio::time::sleep(self.policy.delay(round - 1)).await;
            }
            debug!(round, blocks = pending.len(), concurrency, "dispatching upload round");

            for wave in pending.chunks(concurrency) {
                // Read this wave's byte ranges up front, in ascending offset
                // order, so workers never contend over the file cursor.
                let mut requests = Vec::with_capacity(wave.len());
                for &i in wave {
                    let block = &mut blocks[i];
                    block.status = BlockStatus::InFlight;
                    let buf = read_block(file, file_path, block)?;
                    let digest = md5::compute(&buf);
                    let path = format!(
                        "/FileManager/UploadPart?useJson=true&Bucket={}&Key={}&uploadId={}&partNumber={}&Content-MD5={:x}",
                        target.bucket, target.key, upload_id, block.index, digest
                    );
                    requests.push((i, path, Bytes::from(buf)));
                }

                let results = future::join_all(requests.iter().map(|(_, path, body)| {
                    self.transport.put("UploadPart", path, body.clone())
                }))
                .await;

                for ((i, _, _), result) in requests.into_iter().zip(results) {
                    let block = &mut blocks[i];
                    block.attempts += 1;
                    match result {
                        Ok(_) => block.status = BlockStatus::Succeeded,
                        Err(err) => {
                            warn!(
                                part = block.index,
                                attempt = block.attempts,
                                error = %err,
                                "block upload failed"
                            );
                            block.status = BlockStatus::Failed;
                            last_errors[i] = Some(err);
                        }
                    }
                }
            }

            // Requeue this round's failures for the next one.
            for block in blocks.iter_mut() {
                if block.status == BlockStatus::Failed {
                    block.status = BlockStatus::Pending;
                }
            }
        }

        // Budget exhausted: report the first unfinished block's last error.
        // The final round may still have completed the upload.
        let exhausted = match blocks
            .iter()
            .position(|b| b.status != BlockStatus::Succeeded)
        {
            Some(i) => i,
            None => return Ok(()),
        };
        blocks[exhausted].status = BlockStatus::Failed;
        Err(last_errors[exhausted]
            .take()
            .unwrap_or_else(|| Error::transport("block upload retries exhausted")))
    }
}

/// Read one block's bytes into an immutable buffer.
fn read_block(file: &mut File, path: &Path, block: &BlockState) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(block.offset))
        .map_err(|e| Error::FileAccess {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut buf = vec![0u8; block.length as usize];
    match file.read_exact(&mut buf) {
        Ok(()) => Ok(buf),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(Error::Integrity(format!(
            "file shrank under part {}: expected {} bytes at offset {}",
            block.index, block.length, block.offset
        ))),
        Err(e) => Err(Error::FileAccess {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_plan_70_mib_file() {
        let blocks = plan_blocks(70 * MIB, BLOCK_SIZE);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].length, 32 * MIB);
        assert_eq!(blocks[1].length, 32 * MIB);
        assert_eq!(blocks[2].length, 6 * MIB);
        assert_eq!(blocks[2].offset, 64 * MIB);
        assert_eq!(blocks[2].index, 3);
    }

    #[test]
    fn test_plan_exact_multiple_has_no_empty_trailer() {
        let blocks = plan_blocks(64 * MIB, BLOCK_SIZE);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].length, 32 * MIB);
    }

    #[test]
    fn test_plan_covers_file_without_gaps() {
        for &(size, block_size) in &[
            (1u64, 10u64),
            (9, 10),
            (10, 10),
            (11, 10),
            (95, 10),
            (100, 10),
            (101, 10),
        ] {
            let blocks = plan_blocks(size, block_size);
            let count = (size + block_size - 1) / block_size;
            assert_eq!(blocks.len() as u64, count, "count for size {size}");

            let mut expected_offset = 0;
            for block in &blocks {
                assert_eq!(block.offset, expected_offset);
                assert!(block.length > 0);
                assert!(block.length <= block_size);
                expected_offset += block.length;
            }
            assert_eq!(expected_offset, size, "coverage for size {size}");

            let last = blocks.last().unwrap();
            assert_eq!(last.length, size - block_size * (count - 1));
        }
    }

    #[test]
    fn test_plan_indexes_are_one_based_and_ordered() {
        let blocks = plan_blocks(100, 10);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.index as usize, i + 1);
            assert_eq!(block.status, BlockStatus::Pending);
            assert_eq!(block.attempts, 0);
        }
    }

    #[test]
    fn test_plan_empty_file() {
        assert!(plan_blocks(0, BLOCK_SIZE).is_empty());
    }
}
