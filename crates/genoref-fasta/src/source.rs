//! URI-addressed byte sources with ranged reads.

use std::{
  io::SeekFrom,
  path::{Path, PathBuf},
};

use bytes::Bytes;
use futures_util::StreamExt as _;
use reqwest::{StatusCode, header::RANGE};
use serde::Deserialize;
use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _, AsyncWriteExt as _};
use url::Url;

use crate::{Error, Result};

/// Where the bytes behind a URI live.
#[derive(Debug, Clone)]
pub enum ByteSource {
  Local(PathBuf),
  Remote { client: reqwest::Client, url: Url },
}

impl ByteSource {
  /// Resolve `uri` to a byte source. Bare strings without a scheme are
  /// treated as local paths; `drs://` URIs are resolved to their HTTPS
  /// access URL.
  pub async fn open(uri: &str, client: &reqwest::Client) -> Result<Self> {
    if !uri.contains("://") {
      return Ok(Self::Local(PathBuf::from(uri)));
    }

    let url = Url::parse(uri)?;
    match url.scheme() {
      "file" => url
        .to_file_path()
        .map(Self::Local)
        .map_err(|()| Error::UnsupportedScheme(uri.to_owned())),
      "http" | "https" => Ok(Self::Remote { client: client.clone(), url }),
      "drs" => {
        let url = resolve_drs(&url, client).await?;
        Ok(Self::Remote { client: client.clone(), url })
      }
      _ => Err(Error::UnsupportedScheme(uri.to_owned())),
    }
  }

  /// Human-readable location for logs.
  pub fn describe(&self) -> String {
    match self {
      Self::Local(path) => path.display().to_string(),
      Self::Remote { url, .. } => url.to_string(),
    }
  }

  /// Read the byte window `[from, to)`. A window running past the end of the
  /// source is truncated.
  pub async fn read_range(&self, from: u64, to: u64) -> Result<Bytes> {
    if to <= from {
      return Ok(Bytes::new());
    }
    let len = to - from;

    match self {
      Self::Local(path) => {
        let mut file = tokio::fs::File::open(path).await?;
        file.seek(SeekFrom::Start(from)).await?;
        let mut buf = Vec::with_capacity(len as usize);
        file.take(len).read_to_end(&mut buf).await?;
        Ok(buf.into())
      }
      Self::Remote { client, url } => {
        let res = client
          .get(url.clone())
          .header(RANGE, format!("bytes={from}-{}", to - 1))
          .send()
          .await?;
        match res.status() {
          StatusCode::PARTIAL_CONTENT => Ok(res.bytes().await?),
          // Server ignored the range; cut the window out ourselves.
          StatusCode::OK => {
            let body = res.bytes().await?;
            let start = (from as usize).min(body.len());
            let end = (to as usize).min(body.len());
            Ok(body.slice(start..end))
          }
          status => Err(upstream(url, status)),
        }
      }
    }
  }

  pub async fn read_to_end(&self) -> Result<Bytes> {
    match self {
      Self::Local(path) => Ok(tokio::fs::read(path).await?.into()),
      Self::Remote { client, url } => {
        let res = client.get(url.clone()).send().await?;
        if !res.status().is_success() {
          return Err(upstream(url, res.status()));
        }
        Ok(res.bytes().await?)
      }
    }
  }

  /// Copy the whole source to `dest`, streaming remote bodies. Returns the
  /// number of bytes written.
  pub async fn download_to(&self, dest: &Path) -> Result<u64> {
    match self {
      Self::Local(path) => Ok(tokio::fs::copy(path, dest).await?),
      Self::Remote { client, url } => {
        let res = client.get(url.clone()).send().await?;
        if !res.status().is_success() {
          return Err(upstream(url, res.status()));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = res.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
          let chunk = chunk?;
          file.write_all(&chunk).await?;
          written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
      }
    }
  }
}

fn upstream(url: &Url, status: StatusCode) -> Error {
  Error::Upstream { url: url.to_string(), status: status.as_u16() }
}

// ─── DRS ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DrsObject {
  #[serde(default)]
  access_methods: Vec<DrsAccessMethod>,
}

#[derive(Debug, Deserialize)]
struct DrsAccessMethod {
  #[serde(rename = "type")]
  kind:       String,
  access_url: Option<DrsAccessUrl>,
}

#[derive(Debug, Deserialize)]
struct DrsAccessUrl {
  url: String,
}

/// Object endpoint for a `drs://host/object_id` URI.
pub(crate) fn drs_object_url(uri: &Url) -> Result<Url> {
  let host = uri.host_str().ok_or_else(|| Error::Drs {
    uri:    uri.to_string(),
    reason: "missing host".into(),
  })?;
  let id = uri.path().trim_start_matches('/');
  if id.is_empty() {
    return Err(Error::Drs { uri: uri.to_string(), reason: "missing object id".into() });
  }
  let authority = match uri.port() {
    Some(port) => format!("{host}:{port}"),
    None => host.to_owned(),
  };
  Ok(Url::parse(&format!("https://{authority}/ga4gh/drs/v1/objects/{id}"))?)
}

async fn resolve_drs(uri: &Url, client: &reqwest::Client) -> Result<Url> {
  let endpoint = drs_object_url(uri)?;
  tracing::debug!(%uri, %endpoint, "resolving DRS object");

  let res = client.get(endpoint.clone()).send().await?;
  if !res.status().is_success() {
    return Err(upstream(&endpoint, res.status()));
  }
  let object: DrsObject = res.json().await?;

  let https = object
    .access_methods
    .into_iter()
    .filter(|m| m.kind == "https")
    .find_map(|m| m.access_url)
    .ok_or_else(|| Error::Drs {
      uri:    uri.to_string(),
      reason: "no HTTPS access method".into(),
    })?;
  Ok(Url::parse(&https.url)?)
}
