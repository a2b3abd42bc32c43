//! Media-asset service facade: control-plane operations and uploads

use bytes::Bytes;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Profile;
use crate::error::{Error, Result};
use crate::model::{
    Category, CategoryPage, CreatePage, FailedMedia, FilterBy, Label, MediaInfo, MediaInfoPage,
    MediaMeta, MediaSecondTag, MediaTag, RemovePage, UploadMedia, UploadMediaInfo, UploadTarget,
};
use crate::transport::{HttpTransport, Transport};
use crate::upload::{block, UploadSession};

/// Client for one project's media-asset surface.
///
/// Control-plane operations are thin signed request/response wrappers;
/// `upload_file` drives the full negotiate/transfer/commit/verify pipeline.
pub struct MediaAssets<T: Transport = HttpTransport> {
    transport: T,
    business: i64,
    project: i64,
}

impl MediaAssets<HttpTransport> {
    pub fn new(profile: &Profile) -> Self {
        Self::with_transport(HttpTransport::new(profile), profile.business, profile.project)
    }
}

impl<T: Transport> MediaAssets<T> {
    /// Build a client over any transport - tests drive the upload engine
    /// with a scripted in-memory one.
    pub fn with_transport(transport: T, business: i64, project: i64) -> Self {
        Self {
            transport,
            business,
            project,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn request(&self, action: &str) -> Value {
        json!({
            "TIBusinessID": self.business,
            "TIProjectID": self.project,
            "Action": action,
        })
    }

    fn encode<S: serde::Serialize>(value: &S) -> Result<Value> {
        serde_json::to_value(value)
            .map_err(|e| Error::transport(format!("request encode error: {e}")))
    }

    /// Upload a local file and return its verified media descriptor.
    pub async fn upload_file(
        &self,
        file_path: impl Into<PathBuf>,
        name: &str,
        meta: &MediaMeta,
    ) -> Result<MediaInfo> {
        UploadSession::new(self, file_path).run(name, meta).await
    }

    /// Negotiate an upload destination for a file of the given size.
    ///
    /// Files below the block size request the single-shot path; the service
    /// may also force it in its response.
    pub async fn apply_upload(
        &self,
        name: &str,
        meta: &MediaMeta,
        file_size: u64,
    ) -> Result<UploadTarget> {
        self.apply_upload_with_threshold(name, meta, file_size, block::BLOCK_SIZE)
            .await
    }

    /// `apply_upload` with an explicit single-shot threshold, for sessions
    /// running a non-default block size.
    pub async fn apply_upload_with_threshold(
        &self,
        name: &str,
        meta: &MediaMeta,
        file_size: u64,
        block_size: u64,
    ) -> Result<UploadTarget> {
        let single_shot = file_size < block_size;

        let mut body = self.request("ApplyUpload");
        body["Name"] = name.into();
        body["MediaMeta"] = Self::encode(meta)?;
        body["Size"] = file_size.to_string().into();
        body["Inner"] = false.into();
        if single_shot {
            body["UsePutObject"] = 1.into();
        }

        let response = self.transport.call("ApplyUpload", body).await?;
        let forced = response
            .fields
            .get("UsePutObject")
            .and_then(Value::as_u64)
            == Some(1);
        let mut target: UploadTarget = response.decode()?;
        target.use_put_object = single_shot || forced;
        debug!(media_id = target.media_id, single_shot = target.use_put_object, "upload applied");
        Ok(target)
    }

    /// Finalize a completed upload. Called exactly once per session, only
    /// after every block succeeded; never retried, since the service does
    /// not promise commit is idempotent.
    pub async fn commit_upload(&self, target: &UploadTarget) -> Result<()> {
        let mut body = self.request("CommitUpload");
        body["MediaID"] = target.media_id.into();
        body["Bucket"] = target.bucket.clone().into();
        body["Key"] = target.key.clone().into();
        body["UploadId"] = target.upload_id.clone().unwrap_or_default().into();

        self.transport.call("CommitUpload", body).await.map(|_| ())
    }

    /// Fetch detailed descriptors for the given media ids.
    pub async fn describe_media_details(&self, media_ids: &[u64]) -> Result<Vec<MediaInfo>> {
        let mut body = self.request("DescribeMediaDetails");
        body["MediaIDSet"] = Self::encode(&media_ids)?;

        let page: MediaInfoPage = self
            .transport
            .call("DescribeMediaDetails", body)
            .await?
            .decode()?;
        Ok(page.media_info_set)
    }

    /// Page through the media listing. Returns the page and the total count.
    pub async fn describe_medias(
        &self,
        page_number: u32,
        page_size: u32,
        filter_by: &FilterBy,
    ) -> Result<(Vec<MediaInfo>, u64)> {
        let mut body = self.request("DescribeMedias");
        body["PageNumber"] = page_number.into();
        body["PageSize"] = page_size.into();
        body["FilterBy"] = Self::encode(filter_by)?;
        body["Inner"] = false.into();

        let page: MediaInfoPage = self.transport.call("DescribeMedias", body).await?.decode()?;
        Ok((page.media_info_set, page.total_count))
    }

    /// Remove media items; returns the subset that could not be removed.
    pub async fn remove_medias(&self, media_ids: &[u64]) -> Result<Vec<FailedMedia>> {
        let mut body = self.request("RemoveMedias");
        body["MediaIDSet"] = Self::encode(&media_ids)?;

        let page: RemovePage = self.transport.call("RemoveMedias", body).await?.decode()?;
        Ok(page.failed_media_set)
    }

    /// Enumerate the selectable categories, labels and languages.
    pub async fn describe_categories(
        &self,
    ) -> Result<(Vec<Category>, Vec<Label>, Vec<String>)> {
        let body = self.request("DescribeCategories");
        let page: CategoryPage = self
            .transport
            .call("DescribeCategories", body)
            .await?
            .decode()?;
        Ok((page.category_set, page.label_set, page.lang_set))
    }

    /// Re-tag a media item.
    pub async fn modify_media(
        &self,
        media_id: u64,
        media_tag: MediaTag,
        media_second_tag: Option<MediaSecondTag>,
    ) -> Result<()> {
        let mut body = self.request("ModifyMedia");
        body["MediaID"] = media_id.into();
        body["MediaTag"] = media_tag.as_str().into();
        body["MediaSecondTag"] = media_second_tag
            .map(|t| t.as_str())
            .unwrap_or_default()
            .into();

        self.transport.call("ModifyMedia", body).await.map(|_| ())
    }

    /// Keep a media item alive for `days` more days from now.
    pub async fn modify_expire_time(&self, media_id: u64, days: u32) -> Result<()> {
        let mut body = self.request("ModifyExpireTime");
        body["MediaID"] = media_id.into();
        body["Days"] = days.into();

        self.transport
            .call("ModifyExpireTime", body)
            .await
            .map(|_| ())
    }

    /// Register media from URLs or server-side paths, without uploading.
    pub async fn create_medias(&self, medias: &[UploadMedia]) -> Result<Vec<UploadMediaInfo>> {
        let mut body = self.request("CreateMedias");
        body["UploadMediaSet"] = Self::encode(&medias)?;

        let page: CreatePage = self.transport.call("CreateMedias", body).await?.decode()?;
        Ok(page.upload_media_info_set)
    }

    /// Download a media item's content into memory, via the download URL
    /// from its descriptor.
    pub async fn download_to_buf(&self, download_url: &str) -> Result<Bytes> {
        self.transport.get("DownloadFile", download_url).await
    }

    /// Download a media item's content to `dir/file_name`, creating the
    /// directory if needed. Returns the written path.
    pub async fn download_to_file(
        &self,
        download_url: &str,
        dir: &Path,
        file_name: &str,
    ) -> Result<PathBuf> {
        let content = self.download_to_buf(download_url).await?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::FileAccess {
                path: dir.to_path_buf(),
                source: e,
            })?;

        let path = dir.join(file_name);
        tokio::fs::write(&path, &content)
            .await
            .map_err(|e| Error::FileAccess {
                path: path.clone(),
                source: e,
            })?;
        Ok(path)
    }
}
