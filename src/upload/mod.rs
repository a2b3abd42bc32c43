//! Upload session orchestration: negotiate, transfer, commit, verify

pub mod block;

use bytes::Bytes;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::asset::MediaAssets;
use crate::error::{Error, Result};
use crate::model::{MediaInfo, MediaMeta, UploadTarget};
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use block::{BlockState, BlockUploader, DEFAULT_CONCURRENCY, MAX_CONCURRENCY};

/// Session lifecycle. Any state can move to Failed on an unrecovered error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Negotiated,
    Uploading,
    Committed,
    Verified,
    Failed,
}

/// One file's upload from negotiation through verification.
///
/// The session either reaches Verified and yields the resulting media
/// descriptor, or fails with the first unrecovered error - partial success
/// is never reported.
pub struct UploadSession<'a, T: Transport> {
    assets: &'a MediaAssets<T>,
    file_path: PathBuf,
    block_size: u64,
    concurrency: usize,
    policy: RetryPolicy,
    state: SessionState,
    blocks: Vec<BlockState>,
}

impl<'a, T: Transport> UploadSession<'a, T> {
    pub fn new(assets: &'a MediaAssets<T>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            assets,
            file_path: file_path.into(),
            block_size: block::BLOCK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            policy: RetryPolicy::upload(),
            state: SessionState::Created,
            blocks: Vec::new(),
        }
    }

    /// Override the block size (useful for tests; production stays 32 MiB).
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Block states from the most recent multipart transfer.
    pub fn blocks(&self) -> &[BlockState] {
        &self.blocks
    }

    /// Run the session to completion: apply, transfer, commit, verify.
    pub async fn run(&mut self, name: &str, meta: &MediaMeta) -> Result<MediaInfo> {
        match self.drive(name, meta).await {
            Ok(info) => Ok(info),
            Err(err) => {
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    async fn drive(&mut self, name: &str, meta: &MediaMeta) -> Result<MediaInfo> {
        let metadata =
            std::fs::metadata(&self.file_path).map_err(|e| Error::FileAccess {
                path: self.file_path.clone(),
                source: e,
            })?;
        let file_size = metadata.len();

        let target = self
            .assets
            .apply_upload_with_threshold(name, meta, file_size, self.block_size)
            .await?;
        self.state = SessionState::Negotiated;
        debug!(
            media_id = target.media_id,
            bucket = %target.bucket,
            key = %target.key,
            file_size,
            "upload negotiated"
        );

        self.state = SessionState::Uploading;
        if target.use_put_object || file_size < self.block_size {
            self.put_object(&target).await?;
        } else {
            self.upload_blocks(&target, file_size).await?;
        }

        self.assets.commit_upload(&target).await?;
        self.state = SessionState::Committed;

        // Bytes are on the server now; a verification failure is still the
        // session's terminal error.
        let details = self.assets.describe_media_details(&[target.media_id]).await?;
        let media_info = details
            .into_iter()
            .next()
            .ok_or_else(|| Error::transport("media details missing after commit"))?;
        self.state = SessionState::Verified;
        info!(media_id = media_info.media_id, "upload verified");
        Ok(media_info)
    }

    /// Single-shot path: one PUT of the whole file, retrying transport and
    /// business failures alike under the upload policy.
    async fn put_object(&self, target: &UploadTarget) -> Result<()> {
        let content = std::fs::read(&self.file_path).map_err(|e| Error::FileAccess {
            path: self.file_path.clone(),
            source: e,
        })?;
        let digest = md5::compute(&content);
        let path = format!(
            "/FileManager/PutObject?useJson=true&Bucket={}&Key={}&Content-MD5={:x}",
            target.bucket, target.key, digest
        );
        let body = Bytes::from(content);

        let mut attempt = 1;
        loop {
            match self
                .assets
                .transport()
                .put("PutObject", &path, body.clone())
                .await
            {
                Ok(_) => return Ok(()),
                Err(err) if attempt < self.policy.max_attempts => {
                    warn!(attempt, error = %err, "single-shot upload failed, retrying");
                    tokio::time::sleep(self.policy.delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn upload_blocks(&mut self, target: &UploadTarget, file_size: u64) -> Result<()> {
        let mut blocks = block::plan_blocks(file_size, self.block_size);
        let mut file = std::fs::File::open(&self.file_path).map_err(|e| Error::FileAccess {
            path: self.file_path.clone(),
            source: e,
        })?;

        let uploader = BlockUploader::new(self.assets.transport(), self.policy, self.concurrency);
        let result = uploader
            .run(&mut file, &self.file_path, target, &mut blocks)
            .await;
        self.blocks = blocks;
        result
    }
}
