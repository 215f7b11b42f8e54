//! In-memory provider and record builders for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::file_model::{FileEntry, GOOGLE_FOLDER_MIME};
use crate::providers::{
    sort_entries, DriveProvider, FileFacet, FolderFacet, GoogleRecord, ListContext, ListPage,
    MicrosoftRecord, ParentReference, ProviderError, ProviderType, RemoteItem, SharedDrive,
};

pub(crate) fn google_record(id: &str, name: &str, mime: &str) -> GoogleRecord {
    GoogleRecord {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: mime.to_string(),
        modified_time: Some("2024-01-15T12:00:00Z".to_string()),
        size: None,
        parents: Vec::new(),
        web_view_link: None,
        web_content_link: None,
        icon_link: None,
        drive_id: None,
    }
}

/// Downloadable file; the fake serves `data:<id>` unless told otherwise
pub(crate) fn gfile(id: &str, name: &str) -> FileEntry {
    let mut record = google_record(id, name, "text/plain");
    record.size = Some(format!("data:{}", id).len().to_string());
    record.web_content_link = Some(format!("https://drive.google.com/uc?id={}", id));
    FileEntry::from(record)
}

/// Google-native document without binary content
pub(crate) fn gdoc(id: &str, name: &str) -> FileEntry {
    FileEntry::from(google_record(id, name, "application/vnd.google-apps.document"))
}

pub(crate) fn gfolder(id: &str, name: &str) -> FileEntry {
    FileEntry::from(google_record(id, name, GOOGLE_FOLDER_MIME))
}

pub(crate) fn microsoft_record(id: &str, name: &str) -> MicrosoftRecord {
    MicrosoftRecord {
        id: id.to_string(),
        name: name.to_string(),
        folder: None,
        file: None,
        size: None,
        last_modified_date_time: Some("2024-01-15T12:00:00Z".to_string()),
        parent_reference: None,
        web_url: None,
        download_url: None,
        remote_item: None,
    }
}

pub(crate) fn mfile(id: &str, name: &str) -> FileEntry {
    let mut record = microsoft_record(id, name);
    record.file = Some(FileFacet {
        mime_type: Some("text/plain".to_string()),
    });
    record.size = Some(format!("data:{}", id).len() as u64);
    FileEntry::from(record)
}

pub(crate) fn mfolder(id: &str, name: &str) -> FileEntry {
    let mut record = microsoft_record(id, name);
    record.folder = Some(FolderFacet::default());
    FileEntry::from(record)
}

/// Folder shared from another user's drive, as listed under "Shared with me"
pub(crate) fn mshared_folder(id: &str, name: &str, remote_id: &str, owner_drive: &str) -> FileEntry {
    let mut record = microsoft_record(id, name);
    record.remote_item = Some(RemoteItem {
        id: remote_id.to_string(),
        folder: Some(FolderFacet::default()),
        parent_reference: Some(ParentReference {
            id: None,
            drive_id: Some(owner_drive.to_string()),
        }),
    });
    FileEntry::from(record)
}

async fn read_request_line(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}

fn response_head(content_type: &str, len: usize) -> String {
    format!(
        "HTTP/1.1 200 OK\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        content_type, len
    )
}

/// Localhost server answering the n-th connection with the n-th JSON body.
///
/// Returns the base URL and the request lines received.
pub(crate) async fn serve_json(bodies: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        for body in bodies {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let line = read_request_line(&mut stream).await;
            seen.lock().unwrap().push(line);
            let response = format!("{}{}", response_head("application/json", body.len()), body);
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    (base, requests)
}

/// Localhost server sending `body` one byte per `gap` to a single client
pub(crate) async fn serve_slowly(body: Vec<u8>, gap: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        read_request_line(&mut stream).await;
        let head = response_head("application/octet-stream", body.len());
        if stream.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for byte in body {
            tokio::time::sleep(gap).await;
            if stream.write_all(&[byte]).await.is_err() || stream.flush().await.is_err() {
                return;
            }
        }
        let _ = stream.shutdown().await;
    });
    base
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    List(ListContext, Option<String>),
    Download(String),
}

fn context_key(context: &ListContext) -> String {
    match context {
        ListContext::Folder { folder_id, .. } => folder_id.clone(),
        ListContext::SharedWithMe => "shared-with-me".to_string(),
        ListContext::Recent => "recent".to_string(),
    }
}

/// Provider backed by maps, recording every call
pub(crate) struct FakeDrive {
    page_size: usize,
    children: Mutex<HashMap<String, Vec<FileEntry>>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    broken_listings: Mutex<HashSet<String>>,
    broken_downloads: Mutex<HashSet<String>>,
    flaky_downloads: Mutex<HashMap<String, u32>>,
    drives: Mutex<Vec<SharedDrive>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeDrive {
    pub(crate) fn new() -> Self {
        Self {
            page_size: 100,
            children: Mutex::new(HashMap::new()),
            contents: Mutex::new(HashMap::new()),
            broken_listings: Mutex::new(HashSet::new()),
            broken_downloads: Mutex::new(HashSet::new()),
            flaky_downloads: Mutex::new(HashMap::new()),
            drives: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Children of a folder id, or of "shared-with-me" / "recent"
    pub(crate) fn add_children(&self, key: &str, entries: Vec<FileEntry>) {
        self.children.lock().unwrap().insert(key.to_string(), entries);
    }

    pub(crate) fn set_content(&self, id: &str, bytes: &[u8]) {
        self.contents.lock().unwrap().insert(id.to_string(), bytes.to_vec());
    }

    pub(crate) fn fail_listing(&self, key: &str) {
        self.broken_listings.lock().unwrap().insert(key.to_string());
    }

    pub(crate) fn fail_download(&self, id: &str) {
        self.broken_downloads.lock().unwrap().insert(id.to_string());
    }

    /// Fail the first `times` downloads of `id` with a network error
    pub(crate) fn flaky_download(&self, id: &str, times: u32) {
        self.flaky_downloads.lock().unwrap().insert(id.to_string(), times);
    }

    pub(crate) fn add_drive(&self, id: &str, name: &str) {
        self.drives.lock().unwrap().push(SharedDrive {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn list_calls(&self) -> Vec<ListContext> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::List(context, _) => Some(context),
                Call::Download(_) => None,
            })
            .collect()
    }

    pub(crate) fn download_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Download(id) => Some(id),
                Call::List(..) => None,
            })
            .collect()
    }
}

#[async_trait]
impl DriveProvider for FakeDrive {
    fn provider_type(&self) -> ProviderType {
        ProviderType::GoogleDrive
    }

    async fn list_page(
        &self,
        context: &ListContext,
        page_token: Option<&str>,
    ) -> Result<ListPage, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::List(context.clone(), page_token.map(str::to_string)));

        let key = context_key(context);
        if self.broken_listings.lock().unwrap().contains(&key) {
            return Err(ProviderError::listing_failed(
                context,
                page_token,
                ProviderError::PermissionDenied(key),
            ));
        }

        let all = self.children.lock().unwrap().get(&key).cloned().unwrap_or_default();
        let start: usize = match page_token {
            Some(token) => token
                .trim_start_matches('p')
                .parse()
                .map_err(|_| ProviderError::ParseError(token.to_string()))?,
            None => 0,
        };
        let end = (start + self.page_size).min(all.len());
        let mut entries = all.get(start..end).map(<[FileEntry]>::to_vec).unwrap_or_default();
        sort_entries(&mut entries);

        Ok(ListPage {
            entries,
            next_page_token: (end < all.len()).then(|| format!("p{}", end)),
        })
    }

    async fn download(&self, entry: &FileEntry) -> Result<Vec<u8>, ProviderError> {
        let id = entry.listing_id().to_string();
        self.calls.lock().unwrap().push(Call::Download(id.clone()));

        if self.broken_downloads.lock().unwrap().contains(&id) {
            return Err(ProviderError::PermissionDenied(id));
        }
        {
            let mut flaky = self.flaky_downloads.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(&id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ProviderError::NetworkError("connection reset".to_string()));
                }
            }
        }

        Ok(self
            .contents
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("data:{}", id).into_bytes()))
    }

    fn supports_shared_drives(&self) -> bool {
        true
    }

    async fn list_shared_drives(&self) -> Result<Vec<SharedDrive>, ProviderError> {
        Ok(self.drives.lock().unwrap().clone())
    }
}
