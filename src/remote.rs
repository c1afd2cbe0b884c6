use std::time::Duration;

use reqwest::{Client as HttpClient, ClientBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::{AuthError, CoreError, Result};

/// One remote library as returned by `GET /api2/repos/` (§3 `Library`).
#[derive(Debug, Clone, Deserialize)]
pub struct Library {
    #[serde(rename = "id")]
    pub id: String,
    #[serde(rename = "name")]
    pub name: String,
    #[serde(default, rename = "encrypted")]
    pub encrypted: bool,
    #[serde(default, rename = "permission")]
    pub permission: String,
    #[serde(default, rename = "size")]
    pub size: i64,
    #[serde(default, rename = "mtime")]
    pub mtime: i64,
}

impl Library {
    pub fn is_read_only(&self) -> bool {
        self.permission == "r"
    }
}

/// One node under a library, as returned by the recursive directory listing
/// (§3 `RemoteEntry`).
#[derive(Debug, Clone, Deserialize)]
pub struct RawDirEntry {
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, rename = "id")]
    pub id: String,
    #[serde(default, rename = "mtime")]
    pub mtime: i64,
    #[serde(default, rename = "size")]
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: String,
    pub object_id: String,
    pub mtime: i64,
    pub size: i64,
    pub is_dir: bool,
}

/// Seafile-compatible HTTP client (C3, §4.3). A single instance is shared
/// across operations; callers are responsible for serializing operations
/// within one library's cycle (§4.3 "Connection reuse and concurrency").
#[derive(Clone)]
pub struct RemoteClient {
    base: String,
    http: HttpClient,
    token: Option<String>,
}

impl RemoteClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(10 * 60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(CoreError::from)?;
        Ok(RemoteClient {
            base: base.trim_end_matches('/').to_string(),
            http,
            token: None,
        })
    }

    pub fn with_token(base: &str, token: &str) -> Result<Self> {
        let mut client = Self::new(base)?;
        client.token = Some(token.to_string());
        Ok(client)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.header("Authorization", format!("Token {t}")),
            None => req,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// `POST /api2/auth-token/` — returns the opaque bearer token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let url = self.url("/api2/auth-token/");
        let resp = self
            .http
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(CoreError::from)?;
        if resp.status() == StatusCode::BAD_REQUEST {
            return Err(CoreError::Auth(AuthError::InvalidCredentials));
        }
        if !resp.status().is_success() {
            return Err(CoreError::Auth(AuthError::ServerError(resp.status().as_u16())));
        }
        #[derive(Deserialize)]
        struct TokenBody {
            token: String,
        }
        let body: TokenBody = resp.json().await.map_err(CoreError::from)?;
        Ok(body.token)
    }

    /// `GET /api2/auth/ping/` — body contains `pong` on success.
    pub async fn ping(&self) -> Result<bool> {
        let url = self.url("/api2/auth/ping/");
        let resp = self.authed(self.http.get(url)).send().await.map_err(CoreError::from)?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CoreError::from_status(status.as_u16()));
        }
        Ok(text.contains("pong"))
    }

    /// `GET /api2/repos/` — array of libraries (the server may omit an envelope).
    pub async fn list_libraries(&self) -> Result<Vec<Library>> {
        let url = self.url("/api2/repos/");
        let resp = self.authed(self.http.get(url)).send().await.map_err(CoreError::from)?;
        parse_json_body(resp).await
    }

    /// `POST /api2/repos/{id}/` form `password` — unlocks an encrypted library.
    pub async fn set_library_password(&self, library_id: &str, password: &str) -> Result<()> {
        let url = self.url(&format!("/api2/repos/{library_id}/"));
        let resp = self
            .authed(self.http.post(url))
            .form(&[("password", password)])
            .send()
            .await
            .map_err(CoreError::from)?;
        let status = resp.status();
        if status == StatusCode::BAD_REQUEST {
            return Err(CoreError::Api(crate::error::ApiError::IncorrectPassword));
        }
        if !status.is_success() {
            return Err(CoreError::from_status(status.as_u16()));
        }
        Ok(())
    }

    /// `GET /api2/repos/{id}/dir/?p={path}` — one directory's children.
    async fn list_dir(&self, library_id: &str, path: &str) -> Result<Vec<RawDirEntry>> {
        let url = format!(
            "{}?p={}",
            self.url(&format!("/api2/repos/{library_id}/dir/")),
            encode_query_param(path)
        );
        let resp = self.authed(self.http.get(url)).send().await.map_err(CoreError::from)?;
        parse_json_body(resp).await
    }

    /// Depth-first recursive listing (§4.3 "Recursive listing"): list a path,
    /// emit each child with its full path, recurse into directories.
    pub async fn list_directory_recursive(&self, library_id: &str) -> Result<Vec<RemoteEntry>> {
        let mut out = Vec::new();
        let mut stack = vec!["/".to_string()];
        while let Some(dir) = stack.pop() {
            let children = self.list_dir(library_id, &dir).await?;
            let mut subdirs = Vec::new();
            for child in children {
                let full_path = if dir == "/" {
                    format!("/{}", child.name)
                } else {
                    format!("{}/{}", dir.trim_end_matches('/'), child.name)
                };
                let is_dir = child.kind == "dir";
                if is_dir {
                    subdirs.push(full_path.clone());
                }
                out.push(RemoteEntry {
                    path: full_path,
                    object_id: child.id,
                    mtime: child.mtime,
                    size: if is_dir { 0 } else { child.size },
                    is_dir,
                });
            }
            // depth-first: recurse into the directories just listed before
            // moving to siblings pushed earlier.
            for subdir in subdirs.into_iter().rev() {
                stack.push(subdir);
            }
        }
        Ok(out)
    }

    /// `GET /api2/repos/{id}/file/?p={path}&reuse=1` — returns a download URL.
    pub async fn get_download_link(&self, library_id: &str, path: &str) -> Result<String> {
        let url = format!(
            "{}?p={}&reuse=1",
            self.url(&format!("/api2/repos/{library_id}/file/")),
            encode_query_param(path)
        );
        let resp = self.authed(self.http.get(url)).send().await.map_err(CoreError::from)?;
        parse_quoted_string(resp).await
    }

    /// `GET <download-link>` — streams the file body.
    pub async fn download(&self, link: &str) -> Result<Response> {
        let resp = self.http.get(link).send().await.map_err(CoreError::from)?;
        if !resp.status().is_success() {
            return Err(CoreError::from_status(resp.status().as_u16()));
        }
        Ok(resp)
    }

    /// `GET /api2/repos/{id}/upload-link/?p={parent}` — returns an upload URL.
    pub async fn get_upload_link(&self, library_id: &str, parent: &str) -> Result<String> {
        let url = format!(
            "{}?p={}",
            self.url(&format!("/api2/repos/{library_id}/upload-link/")),
            encode_query_param(parent)
        );
        let resp = self.authed(self.http.get(url)).send().await.map_err(CoreError::from)?;
        parse_quoted_string(resp).await
    }

    /// `POST <upload-link>` multipart `parent_dir`/`replace=1`/`file`.
    pub async fn upload(
        &self,
        upload_link: &str,
        parent_dir: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("parent_dir", parent_dir.to_string())
            .text("replace", "1")
            .part("file", part);
        let resp = self
            .http
            .post(upload_link)
            .multipart(form)
            .send()
            .await
            .map_err(CoreError::from)?;
        let status = resp.status();
        if status.as_u16() == 443 {
            return Err(CoreError::Api(crate::error::ApiError::QuotaExceeded));
        }
        if !status.is_success() {
            return Err(CoreError::from_status(status.as_u16()));
        }
        Ok(())
    }

    /// `DELETE /api2/repos/{id}/file/?p={path}`
    pub async fn delete_file(&self, library_id: &str, path: &str) -> Result<()> {
        let url = format!(
            "{}?p={}",
            self.url(&format!("/api2/repos/{library_id}/file/")),
            encode_query_param(path)
        );
        let resp = self
            .authed(self.http.delete(url))
            .send()
            .await
            .map_err(CoreError::from)?;
        ok_or_status(resp).await
    }

    /// `DELETE /api2/repos/{id}/dir/?p={path}`
    pub async fn delete_dir(&self, library_id: &str, path: &str) -> Result<()> {
        let url = format!(
            "{}?p={}",
            self.url(&format!("/api2/repos/{library_id}/dir/")),
            encode_query_param(path)
        );
        let resp = self
            .authed(self.http.delete(url))
            .send()
            .await
            .map_err(CoreError::from)?;
        ok_or_status(resp).await
    }

    /// `POST /api2/repos/{id}/dir/?p={path}` form `operation=mkdir`.
    pub async fn mkdir(&self, library_id: &str, path: &str) -> Result<()> {
        let url = format!(
            "{}?p={}",
            self.url(&format!("/api2/repos/{library_id}/dir/")),
            encode_query_param(path)
        );
        let resp = self
            .authed(self.http.post(url))
            .form(&[("operation", "mkdir")])
            .send()
            .await
            .map_err(CoreError::from)?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::CREATED {
            return Ok(());
        }
        Err(CoreError::from_status(status.as_u16()))
    }
}

async fn ok_or_status(resp: Response) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(CoreError::from_status(status.as_u16()))
    }
}

/// §6: the client must tolerate a bare JSON array with no envelope.
async fn parse_json_body<T: for<'de> Deserialize<'de>>(resp: Response) -> Result<T> {
    let status = resp.status();
    let text = resp.text().await.map_err(CoreError::from)?;
    if !status.is_success() {
        return Err(CoreError::from_status(status.as_u16()));
    }
    serde_json::from_str(&text).map_err(|_| CoreError::Api(crate::error::ApiError::InvalidResponse))
}

/// §4.3/§6: link endpoints return a JSON-encoded string (with surrounding quotes).
async fn parse_quoted_string(resp: Response) -> Result<String> {
    let status = resp.status();
    let text = resp.text().await.map_err(CoreError::from)?;
    if !status.is_success() {
        return Err(CoreError::from_status(status.as_u16()));
    }
    Ok(unwrap_quoted(text.trim()))
}

fn unwrap_quoted(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// §4.3 "Path encoding": percent-encode `p` using the URL-query allowed set,
/// preserving the leading `/`.
fn encode_query_param(path: &str) -> String {
    form_urlencoded::byte_serialize(path.as_bytes()).collect()
}

/// Serializable shape for persisting an `Account` alongside the secret store
/// when an embedder wants a non-secret mirror (not used by the core itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRef {
    pub server_url: String,
    pub username: String,
}
