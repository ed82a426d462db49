use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use std::time::Duration;

use super::{content_type_for, BlobStore, StorageError};

const STORAGE_API_VERSION: &str = "2023-11-03";

/// Azure Blob Storage over the REST API, authorised by a SAS token.
pub struct AzureBlobStore {
    client: Client,
    account_url: Url,
    sas_token: Option<String>,
}

impl AzureBlobStore {
    pub fn new(
        account_url: &str,
        sas_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let account_url = Url::parse(account_url)
            .map_err(|e| StorageError::Request(format!("invalid account URL: {}", e)))?;
        if account_url.cannot_be_a_base() {
            return Err(StorageError::Request(format!(
                "invalid account URL: {}",
                account_url
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Request(e.to_string()))?;
        let sas_token = sas_token
            .map(|s| s.trim().trim_start_matches('?').to_string())
            .filter(|s| !s.is_empty());
        Ok(Self {
            client,
            account_url,
            sas_token,
        })
    }

    fn container_url(&self, container: &str) -> Url {
        let mut url = self.account_url.clone();
        url.set_query(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(container);
        }
        url
    }

    fn blob_url(&self, container: &str, name: &str) -> Url {
        let mut url = self.container_url(container);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(name.split('/'));
        }
        url
    }

    fn with_sas(&self, mut url: Url) -> Url {
        if let Some(sas) = &self.sas_token {
            url.set_query(Some(sas));
        }
        url
    }

    fn put_request(
        &self,
        container: &str,
        name: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> RequestBuilder {
        let url = self.with_sas(self.blob_url(container, name));
        let request = self
            .client
            .put(url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", content_type_for(name))
            .body(bytes.to_vec());
        if overwrite {
            request
        } else {
            request.header("If-None-Match", "*")
        }
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        request
            .header("x-ms-version", STORAGE_API_VERSION)
            .send()
            .map_err(|e| StorageError::Request(e.to_string()))
    }
}

fn status_error(response: Response) -> StorageError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    StorageError::Status { status, body }
}

/// `AlreadyExists` for the statuses a conditional put fails with when the blob is present.
fn put_conflict(
    status: StatusCode,
    overwrite: bool,
    container: &str,
    name: &str,
) -> Option<StorageError> {
    match status {
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED if !overwrite => {
            Some(StorageError::AlreadyExists {
                container: container.to_string(),
                name: name.to_string(),
            })
        }
        _ => None,
    }
}

/// Blob names and the continuation marker from one `List Blobs` page.
fn parse_blob_listing(xml: &str) -> Result<(Vec<String>, Option<String>), StorageError> {
    let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));
    // No trimming: blob names may begin or end with spaces.
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut names = Vec::new();
    let mut marker = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => path.push(e.name().as_ref().to_vec()),
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| StorageError::InvalidListing(e.to_string()))?
                    .into_owned();
                let tail: Vec<&[u8]> = path.iter().rev().take(2).map(|p| p.as_slice()).collect();
                match tail.as_slice() {
                    [b"Name", b"Blob"] => names.push(text),
                    [b"NextMarker", b"EnumerationResults"] if !text.is_empty() => {
                        marker = Some(text)
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(StorageError::InvalidListing(e.to_string())),
            _ => {}
        }
    }
    Ok((names, marker))
}

impl BlobStore for AzureBlobStore {
    fn list(&self, container: &str) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut url = self.with_sas(self.container_url(container));
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("restype", "container").append_pair("comp", "list");
                if let Some(m) = &marker {
                    query.append_pair("marker", m);
                }
            }
            let response = self.send(self.client.get(url))?;
            if !response.status().is_success() {
                return Err(status_error(response));
            }
            let body = response
                .text()
                .map_err(|e| StorageError::Request(e.to_string()))?;
            let (page, next) = parse_blob_listing(&body)?;
            names.extend(page);
            match next {
                Some(m) => marker = Some(m),
                None => break,
            }
        }
        tracing::debug!(container, count = names.len(), "Listed blobs");
        Ok(names)
    }

    fn url(&self, container: &str, name: &str) -> String {
        self.blob_url(container, name).to_string()
    }

    fn access_url(&self, container: &str, name: &str) -> String {
        self.with_sas(self.blob_url(container, name)).to_string()
    }

    fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.with_sas(self.blob_url(container, name));
        let response = self.send(self.client.get(url))?;
        match response.status() {
            s if s.is_success() => Ok(response
                .bytes()
                .map_err(|e| StorageError::Request(e.to_string()))?
                .to_vec()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound {
                container: container.to_string(),
                name: name.to_string(),
            }),
            _ => Err(status_error(response)),
        }
    }

    fn put(
        &self,
        container: &str,
        name: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let request = self.put_request(container, name, bytes, overwrite);
        let response = self.send(request)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match put_conflict(status, overwrite, container, name) {
            Some(e) => Err(e),
            None => Err(status_error(response)),
        }
    }

    fn delete(&self, container: &str, name: &str) -> Result<(), StorageError> {
        let url = self.with_sas(self.blob_url(container, name));
        let response = self.send(self.client.delete(url))?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound {
                container: container.to_string(),
                name: name.to_string(),
            }),
            _ => Err(status_error(response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(sas: Option<&str>) -> AzureBlobStore {
        AzureBlobStore::new(
            "https://acct.blob.core.windows.net",
            sas,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn blob_urls_encode_names_and_keep_sas_out_of_plain_url() {
        let s = store(Some("?sv=2022-11-02&sig=abc"));
        assert_eq!(
            s.url("raw", "scans/docket 1.pdf"),
            "https://acct.blob.core.windows.net/raw/scans/docket%201.pdf"
        );
        assert_eq!(
            s.access_url("raw", "docket0001.pdf"),
            "https://acct.blob.core.windows.net/raw/docket0001.pdf?sv=2022-11-02&sig=abc"
        );
    }

    #[test]
    fn access_url_without_sas_is_plain() {
        let s = store(None);
        assert_eq!(s.access_url("raw", "a.pdf"), s.url("raw", "a.pdf"));
    }

    #[test]
    fn listing_page_with_marker() {
        let xml = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\
            <EnumerationResults ServiceEndpoint=\"https://acct.blob.core.windows.net/\" ContainerName=\"raw\">\
            <Blobs>\
            <Blob><Name>docket0001.pdf</Name><Properties><Content-Length>10</Content-Length></Properties></Blob>\
            <Blob><Name>a &amp; b.pdf</Name><Properties /></Blob>\
            </Blobs>\
            <NextMarker>2!64!MDAwMDE</NextMarker>\
            </EnumerationResults>";
        let (names, marker) = parse_blob_listing(xml).unwrap();
        assert_eq!(names, ["docket0001.pdf", "a & b.pdf"]);
        assert_eq!(marker.as_deref(), Some("2!64!MDAwMDE"));
    }

    #[test]
    fn listing_keeps_surrounding_spaces_in_names() {
        let xml = "<EnumerationResults>\n  <Blobs>\n    <Blob><Name> docket 1.pdf </Name></Blob>\n  </Blobs>\n  <NextMarker />\n</EnumerationResults>";
        let (names, marker) = parse_blob_listing(xml).unwrap();
        assert_eq!(names, [" docket 1.pdf "]);
        assert!(marker.is_none());
    }

    #[test]
    fn conditional_put_sends_if_none_match() {
        let s = store(Some("sig=abc"));
        let request = s
            .put_request("processed", "a_results.xlsx", b"xlsx", false)
            .build()
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::PUT);
        assert_eq!(request.headers()["If-None-Match"], "*");
        assert_eq!(request.headers()["x-ms-blob-type"], "BlockBlob");
        assert_eq!(
            request.headers()["Content-Type"],
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(request.url().query(), Some("sig=abc"));

        let request = s
            .put_request("processed", "a_results.xlsx", b"xlsx", true)
            .build()
            .unwrap();
        assert!(request.headers().get("If-None-Match").is_none());
    }

    #[test]
    fn existing_blob_statuses_map_to_already_exists() {
        for status in [StatusCode::CONFLICT, StatusCode::PRECONDITION_FAILED] {
            match put_conflict(status, false, "processed", "a.pdf") {
                Some(StorageError::AlreadyExists { container, name }) => {
                    assert_eq!(container, "processed");
                    assert_eq!(name, "a.pdf");
                }
                other => panic!("expected AlreadyExists for {status}, got {other:?}"),
            }
            assert!(put_conflict(status, true, "processed", "a.pdf").is_none());
        }
        assert!(put_conflict(StatusCode::FORBIDDEN, false, "processed", "a.pdf").is_none());
    }

    #[test]
    fn last_listing_page_has_no_marker() {
        let xml = "<EnumerationResults><Blobs /><NextMarker /></EnumerationResults>";
        let (names, marker) = parse_blob_listing(xml).unwrap();
        assert!(names.is_empty());
        assert!(marker.is_none());
    }

    #[test]
    fn broken_listing_is_rejected() {
        assert!(matches!(
            parse_blob_listing("<EnumerationResults><Blobs></Nope>"),
            Err(StorageError::InvalidListing(_))
        ));
    }
}
