use harvest_core::{
    is_valid_post_id, CoreError, MediaDownloader, MediaError, MediaSettings, MediaSource,
    MediaTask,
};
use reqwest::{header, Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// File extension for a media `Content-Type`, e.g. `image/jpeg` -> `jpeg`.
/// Anything that is not image, video or audio is rejected.
pub fn extension_for_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let (kind, subtype) = essence.split_once('/')?;
    if !matches!(kind, "image" | "video" | "audio") {
        return None;
    }
    let ext = subtype.split('+').next()?.trim();
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    Some(ext.to_string())
}

/// File stems for a gallery: audio at `{id}`, images at `{id}_{NN}`.
pub fn gallery_stems(post_id: &str, image_count: usize) -> Vec<String> {
    (0..image_count)
        .map(|index| format!("{}_{:02}", post_id, index))
        .collect()
}

/// Downloads post media over HTTP, handing video pages without a direct
/// stream to an external downloader when one is configured.
#[derive(Debug, Clone)]
pub struct HttpMediaDownloader {
    http_client: Client,
    downloader_command: Option<String>,
    read_timeout: Duration,
    tool_timeout: Duration,
}

impl HttpMediaDownloader {
    pub fn new(settings: &MediaSettings, user_agent: &str) -> Result<Self, CoreError> {
        let read_timeout = Duration::from_secs(settings.timeout_secs);
        let http_client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(read_timeout)
            .build()?;

        Ok(Self {
            http_client,
            downloader_command: settings
                .downloader_command
                .clone()
                .filter(|command| !command.trim().is_empty()),
            read_timeout,
            tool_timeout: Duration::from_secs(settings.tool_timeout_secs),
        })
    }

    /// Stream `url` to `{dir}/{stem}.{ext}`, with the extension taken from
    /// the response. The body lands in a `.part` file first so an
    /// interrupted download never looks complete.
    pub async fn download_file(
        &self,
        post_id: &str,
        url: &str,
        dir: &Path,
        stem: &str,
    ) -> Result<PathBuf, CoreError> {
        let unavailable = |reason: String| MediaError::Unavailable {
            post_id: post_id.to_string(),
            reason,
        };

        let mut response = self.http_client.get(url).send().await?;
        let status = response.status();
        match status {
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(unavailable(format!("server answered {}", status)).into());
            }
            s if !s.is_success() => {
                return Err(unavailable(format!("unexpected status {}", status)).into());
            }
            _ => {}
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        let ext = extension_for_content_type(&content_type).ok_or_else(|| {
            MediaError::UnsupportedContentType {
                post_id: post_id.to_string(),
                content_type: content_type.clone(),
            }
        })?;

        let target = dir.join(format!("{}.{}", stem, ext));
        let partial = dir.join(format!("{}.{}.part", stem, ext));
        let mut file = fs::File::create(&partial).await?;

        let written = async {
            loop {
                let chunk = tokio::time::timeout(self.read_timeout, response.chunk())
                    .await
                    .map_err(|_| CoreError::Timeout {
                        seconds: self.read_timeout.as_secs(),
                    })??;
                match chunk {
                    Some(bytes) => file.write_all(&bytes).await?,
                    None => break,
                }
            }
            file.flush().await?;
            Ok::<(), CoreError>(())
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&partial).await;
            return Err(e);
        }
        drop(file);
        fs::rename(&partial, &target).await?;

        debug!("Saved {}", target.display());
        Ok(target)
    }

    /// Let the external downloader resolve a post page. Output goes to
    /// `{dir}/{id}.{ext}`, the extension chosen by the tool.
    pub async fn run_external(
        &self,
        post_id: &str,
        page_url: &str,
        dir: &Path,
    ) -> Result<Vec<PathBuf>, CoreError> {
        let Some(command) = &self.downloader_command else {
            return Err(MediaError::Unavailable {
                post_id: post_id.to_string(),
                reason: "no direct stream and no external downloader configured".to_string(),
            }
            .into());
        };

        let template = dir.join(format!("{}.%(ext)s", post_id));
        debug!("Running {} for {}", command, page_url);
        let result = tokio::time::timeout(
            self.tool_timeout,
            Command::new(command)
                .arg("--quiet")
                .arg("--no-progress")
                .arg("-o")
                .arg(&template)
                .arg(page_url)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let tool_failed = |details: String| MediaError::ToolFailed {
            post_id: post_id.to_string(),
            details,
        };
        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(tool_failed(format!("cannot run {}: {}", command, e)).into()),
            Err(_) => {
                return Err(tool_failed(format!(
                    "{} timed out after {:?}",
                    command, self.tool_timeout
                ))
                .into())
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(tool_failed(format!(
                "{} exited with {}: {}",
                command, output.status, last_line
            ))
            .into());
        }

        let files = files_for_post(dir, post_id).await?;
        if files.is_empty() {
            return Err(
                tool_failed(format!("{} reported success but wrote nothing", command)).into(),
            );
        }
        Ok(files)
    }

    async fn download_gallery(
        &self,
        post_id: &str,
        image_urls: &[String],
        audio_url: Option<&str>,
        dir: &Path,
    ) -> Result<Vec<PathBuf>, CoreError> {
        let mut saved = Vec::new();
        let mut first_error = None;

        for (url, stem) in image_urls.iter().zip(gallery_stems(post_id, image_urls.len())) {
            match self.download_file(post_id, url, dir, &stem).await {
                Ok(path) => saved.push(path),
                Err(e) => {
                    warn!("Gallery image {} of {} failed: {}", stem, post_id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if saved.is_empty() {
            return Err(first_error.unwrap_or_else(|| {
                MediaError::Unavailable {
                    post_id: post_id.to_string(),
                    reason: "gallery has no images".to_string(),
                }
                .into()
            }));
        }

        // The soundtrack is optional; losing it does not fail the post.
        if let Some(audio_url) = audio_url {
            match self.download_file(post_id, audio_url, dir, post_id).await {
                Ok(path) => saved.push(path),
                Err(e) => warn!("Soundtrack of {} failed: {}", post_id, e),
            }
        }

        Ok(saved)
    }
}

async fn files_for_post(dir: &Path, post_id: &str) -> Result<Vec<PathBuf>, CoreError> {
    let prefix = format!("{}.", post_id);
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(&prefix) || name.ends_with(".part") {
            continue;
        }
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

impl MediaDownloader for HttpMediaDownloader {
    async fn download(
        &self,
        task: &MediaTask,
        destination: &Path,
    ) -> Result<Vec<PathBuf>, CoreError> {
        let post_id = task.post_id.as_str();
        // The id becomes a file name inside `destination`.
        if !is_valid_post_id(post_id) {
            return Err(CoreError::InvalidInput {
                message: format!("post id {:?} cannot name a media file", post_id),
            });
        }
        fs::create_dir_all(destination).await?;

        let files = match &task.source {
            MediaSource::Video {
                page_url,
                direct_url: Some(url),
            } => match self.download_file(post_id, url, destination, post_id).await {
                Ok(path) => vec![path],
                // Stream URLs expire; the post page outlives them.
                Err(CoreError::Media(MediaError::Unavailable { reason, .. }))
                    if self.downloader_command.is_some() =>
                {
                    debug!("Direct stream of {} unavailable ({}), trying page", post_id, reason);
                    self.run_external(post_id, page_url, destination).await?
                }
                Err(e) => return Err(e),
            },
            MediaSource::Video {
                page_url,
                direct_url: None,
            } => self.run_external(post_id, page_url, destination).await?,
            MediaSource::Gallery {
                image_urls,
                audio_url,
            } => {
                self.download_gallery(post_id, image_urls, audio_url.as_deref(), destination)
                    .await?
            }
        };

        info!("Downloaded {} file(s) for post {}", files.len(), post_id);
        Ok(files)
    }
}
