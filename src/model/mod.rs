//! Wire types and response structures for the media-asset service

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Universal success sentinel used by every operation.
pub const OK_CODE: &str = "ok";

/// Error object embedded in a 2xx response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

/// Outer response envelope: `{"Response": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Response")]
    pub response: ResponseBody,
}

impl Envelope {
    /// Decode an envelope from raw body bytes. A body that does not parse is
    /// a transport-level failure, not a service verdict.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::transport(format!("invalid response envelope: {e}")))
    }
}

/// Inner response body: request id, optional error, and the action-specific
/// payload fields kept as raw JSON until an operation decodes them.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseBody {
    #[serde(rename = "RequestID", default)]
    pub request_id: String,
    #[serde(rename = "Error")]
    pub error: Option<WireError>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl ResponseBody {
    /// Surface an embedded error code other than "ok" as a business error.
    pub fn check(self) -> Result<Self> {
        if let Some(err) = &self.error {
            if err.code != OK_CODE {
                return Err(Error::Business {
                    code: err.code.clone(),
                    message: err.message.clone(),
                    request_id: self.request_id.clone(),
                });
            }
        }
        Ok(self)
    }

    /// Decode the payload fields into an action-specific type.
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(Value::Object(self.fields))
            .map_err(|e| Error::transport(format!("invalid response body: {e}")))
    }
}

/// Media lifecycle states reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaState {
    #[serde(rename = "上传中")]
    Uploading,
    #[serde(rename = "等待验证")]
    WaitingVerify,
    #[serde(rename = "上传完成")]
    Completed,
    #[serde(rename = "上传失败")]
    Failed,
    #[serde(rename = "下载素材中")]
    Downloading,
    #[serde(rename = "验证素材中")]
    Verifying,
    #[serde(rename = "素材已删除")]
    Deleted,
    #[serde(rename = "素材已清理")]
    Cleaned,
}

impl MediaState {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaState::Uploading => "上传中",
            MediaState::WaitingVerify => "等待验证",
            MediaState::Completed => "上传完成",
            MediaState::Failed => "上传失败",
            MediaState::Downloading => "下载素材中",
            MediaState::Verifying => "验证素材中",
            MediaState::Deleted => "素材已删除",
            MediaState::Cleaned => "素材已清理",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "上传中" => Some(MediaState::Uploading),
            "等待验证" => Some(MediaState::WaitingVerify),
            "上传完成" => Some(MediaState::Completed),
            "上传失败" => Some(MediaState::Failed),
            "下载素材中" => Some(MediaState::Downloading),
            "验证素材中" => Some(MediaState::Verifying),
            "素材已删除" => Some(MediaState::Deleted),
            "素材已清理" => Some(MediaState::Cleaned),
            _ => None,
        }
    }

    /// Failed, deleted and cleaned media will never become available.
    pub fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            MediaState::Failed | MediaState::Deleted | MediaState::Cleaned
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, MediaState::Completed)
    }
}

/// Media content kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "视频")]
    Video,
    #[serde(rename = "直播流")]
    Live,
    #[serde(rename = "图片")]
    Image,
    #[serde(rename = "音频")]
    Audio,
    #[serde(rename = "文稿")]
    Text,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Video => "视频",
            MediaType::Live => "直播流",
            MediaType::Image => "图片",
            MediaType::Audio => "音频",
            MediaType::Text => "文稿",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "视频" => Some(MediaType::Video),
            "直播流" => Some(MediaType::Live),
            "图片" => Some(MediaType::Image),
            "音频" => Some(MediaType::Audio),
            "文稿" => Some(MediaType::Text),
            _ => None,
        }
    }
}

/// Primary category tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaTag {
    #[serde(rename = "新闻")]
    News,
    #[serde(rename = "综艺")]
    Entertainment,
    #[serde(rename = "互联网资讯")]
    InternetInfo,
    #[serde(rename = "电影")]
    Movie,
    #[serde(rename = "电视剧")]
    Series,
    #[serde(rename = "专题")]
    Special,
    #[serde(rename = "体育")]
    Sport,
}

impl MediaTag {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaTag::News => "新闻",
            MediaTag::Entertainment => "综艺",
            MediaTag::InternetInfo => "互联网资讯",
            MediaTag::Movie => "电影",
            MediaTag::Series => "电视剧",
            MediaTag::Special => "专题",
            MediaTag::Sport => "体育",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "新闻" => Some(MediaTag::News),
            "综艺" => Some(MediaTag::Entertainment),
            "互联网资讯" => Some(MediaTag::InternetInfo),
            "电影" => Some(MediaTag::Movie),
            "电视剧" => Some(MediaTag::Series),
            "专题" => Some(MediaTag::Special),
            "体育" => Some(MediaTag::Sport),
            _ => None,
        }
    }
}

/// Secondary category tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaSecondTag {
    #[serde(rename = "晚会")]
    Evening,
    #[serde(rename = "其他")]
    Other,
}

impl MediaSecondTag {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaSecondTag::Evening => "晚会",
            MediaSecondTag::Other => "其他",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "晚会" => Some(MediaSecondTag::Evening),
            "其他" => Some(MediaSecondTag::Other),
            _ => None,
        }
    }
}

/// Spoken languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaLang {
    #[serde(rename = "普通话")]
    Mandarin,
    #[serde(rename = "粤语")]
    Cantonese,
}

impl MediaLang {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaLang::Mandarin => "普通话",
            MediaLang::Cantonese => "粤语",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "普通话" => Some(MediaLang::Mandarin),
            "粤语" => Some(MediaLang::Cantonese),
            _ => None,
        }
    }
}

/// Classification attached to a media item. Values travel as the service's
/// wire strings; the typed constructor keeps them inside the closed sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMeta {
    #[serde(rename = "MediaType")]
    pub media_type: String,
    #[serde(rename = "MediaTag")]
    pub media_tag: String,
    #[serde(rename = "MediaSecondTag", default)]
    pub media_second_tag: String,
    #[serde(rename = "MediaLang", default)]
    pub media_lang: String,
}

impl MediaMeta {
    pub fn new(
        media_type: MediaType,
        media_tag: MediaTag,
        media_second_tag: Option<MediaSecondTag>,
        media_lang: MediaLang,
    ) -> Self {
        Self {
            media_type: media_type.as_str().to_string(),
            media_tag: media_tag.as_str().to_string(),
            media_second_tag: media_second_tag.map(|t| t.as_str().to_string()).unwrap_or_default(),
            media_lang: media_lang.as_str().to_string(),
        }
    }
}

/// Media descriptor returned by detail and listing calls. The service omits
/// fields freely, so everything defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaInfo {
    #[serde(rename = "MediaID")]
    pub media_id: u64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Duration")]
    pub duration: f64,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "Width")]
    pub width: u32,
    #[serde(rename = "Height")]
    pub height: u32,
    #[serde(rename = "FPS")]
    pub fps: f64,
    #[serde(rename = "BitRate")]
    pub bit_rate: u64,
    #[serde(rename = "Format")]
    pub format: String,
    #[serde(rename = "DownLoadURL")]
    pub download_url: String,
    #[serde(rename = "FailedReason")]
    pub failed_reason: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "MediaType")]
    pub media_type: String,
    #[serde(rename = "MediaTag")]
    pub media_tag: String,
    #[serde(rename = "MediaSecondTag")]
    pub media_second_tag: String,
    #[serde(rename = "MediaLang")]
    pub media_lang: String,
}

impl MediaInfo {
    /// The descriptor's lifecycle state, when the wire string is known.
    pub fn state(&self) -> Option<MediaState> {
        MediaState::parse(&self.status)
    }
}

/// Listing filter for DescribeMedias.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterBy {
    #[serde(rename = "MediaNameOrID")]
    pub media_name_or_id: String,
    #[serde(rename = "MediaTypeSet")]
    pub media_type_set: Vec<String>,
    #[serde(rename = "MediaTagSet")]
    pub media_tag_set: Vec<Label>,
    #[serde(rename = "StatusSet")]
    pub status_set: Vec<String>,
}

/// Category entry: a media type and its primary tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "Type")]
    pub media_type: String,
    #[serde(rename = "TagSet", default)]
    pub tag_set: Vec<String>,
}

/// Label entry: a primary tag and its secondary tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    #[serde(rename = "Type")]
    pub media_type: String,
    #[serde(rename = "Tag")]
    pub tag: String,
    #[serde(rename = "SecondTagSet", default)]
    pub second_tag_set: Vec<String>,
}

/// Per-item failure from RemoveMedias.
#[derive(Debug, Clone, Deserialize)]
pub struct FailedMedia {
    #[serde(rename = "MediaID")]
    pub media_id: u64,
    #[serde(rename = "FailedReason", default)]
    pub failed_reason: String,
}

/// Request item for CreateMedias (media registered from a URL or a
/// server-side path instead of uploaded content).
#[derive(Debug, Clone, Serialize)]
pub struct UploadMedia {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "LocalPath")]
    pub local_path: String,
    #[serde(rename = "MediaURL")]
    pub media_url: String,
    #[serde(rename = "MediaMeta")]
    pub media_meta: MediaMeta,
    #[serde(rename = "ContentMD5")]
    pub content_md5: String,
}

/// Per-item result from CreateMedias.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadMediaInfo {
    #[serde(rename = "MediaID")]
    pub media_id: u64,
    #[serde(rename = "FailedReason", default)]
    pub failed_reason: String,
}

/// Negotiated upload destination. Produced once by ApplyUpload and never
/// mutated afterwards; every block request consumes it.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadTarget {
    #[serde(rename = "MediaID", default)]
    pub media_id: u64,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId", default)]
    pub upload_id: Option<String>,
    /// Service or size decision to transfer the whole file in one request.
    #[serde(skip)]
    pub use_put_object: bool,
}

/// DescribeMedias / DescribeMediaDetails payload.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaInfoPage {
    #[serde(rename = "MediaInfoSet", default)]
    pub media_info_set: Vec<MediaInfo>,
    #[serde(rename = "TotalCount", default)]
    pub total_count: u64,
}

/// DescribeCategories payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryPage {
    #[serde(rename = "CategorySet", default)]
    pub category_set: Vec<Category>,
    #[serde(rename = "LabelSet", default)]
    pub label_set: Vec<Label>,
    #[serde(rename = "LangSet", default)]
    pub lang_set: Vec<String>,
}

/// RemoveMedias payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RemovePage {
    #[serde(rename = "FailedMediaSet", default)]
    pub failed_media_set: Vec<FailedMedia>,
}

/// CreateMedias payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePage {
    #[serde(rename = "UploadMediaInfoSet", default)]
    pub upload_media_info_set: Vec<UploadMediaInfo>,
}
