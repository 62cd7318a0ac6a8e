//! Collector - Fetches the instant fuel-price feed and decodes it
//!
//! Responsibilities:
//! - Download the national fuel-price CSV export over HTTP
//! - Or load a previously downloaded export from disk
//! - Hash the payload so a run can be correlated with the bytes it saw
//! - Decode the `;`-delimited CSV into a snapshot addressable by column name
//!
//! The collector does no filtering or typing: every field stays text.
//! Projection and casting belong to the updater's normalizer.

use anyhow::{Context, Result};
use csv::StringRecord;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Export endpoint of the "prix des carburants en France - flux instantané v2" dataset.
pub const FEED_URL: &str = "https://data.economie.gouv.fr/api/explore/v2.1/catalog/datasets/prix-des-carburants-en-france-flux-instantane-v2/exports/csv";

const USER_AGENT: &str = "carbu-updater/0.1 (fuel price warehouse loader)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const FEED_DELIMITER: u8 = b';';

// =============================================================================
// Snapshot
// =============================================================================

/// One decoded export: a header row plus text records.
#[derive(Debug, Clone, Default)]
pub struct RawSnapshot {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    records: Vec<(usize, StringRecord)>,
    skipped: Vec<usize>,
}

/// A borrowed view of one record, addressed by column name.
#[derive(Debug, Clone, Copy)]
pub struct RawRow<'a> {
    index: &'a HashMap<String, usize>,
    record: &'a StringRecord,
    line: usize,
}

impl<'a> RawRow<'a> {
    /// Field value for `column`, or `None` if the column does not exist.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.index.get(column).and_then(|&i| self.record.get(i))
    }

    /// 1-based line number of the record in the source file.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl RawSnapshot {
    /// Test fixture: a snapshot from in-memory rows, numbered from line 2.
    #[cfg(any(test, feature = "test-util"))]
    pub fn from_rows<H, R>(headers: &[H], rows: &[R]) -> Self
    where
        H: AsRef<str>,
        R: AsRef<[&'static str]>,
    {
        let headers: Vec<String> = headers.iter().map(|h| h.as_ref().to_string()).collect();
        let records = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (i + 2, StringRecord::from(r.as_ref().to_vec())))
            .collect();
        Self::new(headers, records, Vec::new())
    }

    fn new(
        headers: Vec<String>,
        records: Vec<(usize, StringRecord)>,
        skipped: Vec<usize>,
    ) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Self {
            headers,
            index,
            records,
            skipped,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Source lines of the records the decoder had to skip.
    pub fn skipped_lines(&self) -> &[usize] {
        &self.skipped
    }

    pub fn rows(&self) -> impl Iterator<Item = RawRow<'_>> {
        self.records.iter().map(move |(line, record)| RawRow {
            index: &self.index,
            record,
            line: *line,
        })
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode raw export bytes into a snapshot.
///
/// The BOM is dropped and invalid UTF-8 is replaced rather than rejected.
/// Records the CSV reader cannot split are skipped with a warning.
pub fn decode_csv(bytes: &[u8]) -> Result<RawSnapshot> {
    let (content, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
    if had_errors {
        warn!("feed contains invalid UTF-8, offending bytes were replaced");
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(FEED_DELIMITER)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut records = Vec::new();
    let mut skipped = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                let line = record
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(idx + 2);
                records.push((line, record));
            }
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(idx + 2);
                warn!(line, error = %e, "skipping undecodable feed record");
                skipped.push(line);
            }
        }
    }

    debug!(
        columns = headers.len(),
        records = records.len(),
        skipped = skipped.len(),
        "decoded feed"
    );

    Ok(RawSnapshot::new(headers, records, skipped))
}

/// `sha256:<hex>` digest of a payload.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

// =============================================================================
// Sources
// =============================================================================

/// HTTP client for the feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
}

impl FeedClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Download and decode the export at `url`.
    pub async fn fetch_snapshot(&self, url: &str) -> Result<RawSnapshot> {
        info!(url, "fetching fuel price feed");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Feed returned non-success status {}", status);
        }

        let bytes = resp.bytes().await.context("Failed to read feed body")?;
        info!(
            size_bytes = bytes.len(),
            hash = %content_hash(&bytes),
            "downloaded feed"
        );

        decode_csv(&bytes)
    }
}

/// Load an export previously saved to disk.
pub async fn load_snapshot_file(path: &Path) -> Result<RawSnapshot> {
    info!(path = %path.display(), "reading fuel price feed from file");
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read feed file {}", path.display()))?;
    info!(
        size_bytes = bytes.len(),
        hash = %content_hash(&bytes),
        "loaded feed"
    );
    decode_csv(&bytes)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SAMPLE: &str = "id;cp;ville;code_region;gazole_prix\n\
                          75001001;75001;Paris;11;1.789\n\
                          13001001;13001;Marseille;93;\n";

    #[test]
    fn test_decode_headers_and_rows() {
        let snapshot = decode_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(snapshot.headers(), &["id", "cp", "ville", "code_region", "gazole_prix"]);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.column_index("ville"), Some(2));
        assert_eq!(snapshot.column_index("missing"), None);
    }

    #[test]
    fn test_rows_addressable_by_name() {
        let snapshot = decode_csv(SAMPLE.as_bytes()).unwrap();
        let rows: Vec<_> = snapshot.rows().collect();
        assert_eq!(rows[0].get("ville"), Some("Paris"));
        assert_eq!(rows[0].get("gazole_prix"), Some("1.789"));
        assert_eq!(rows[1].get("gazole_prix"), Some(""));
        assert_eq!(rows[1].get("nope"), None);
    }

    #[test]
    fn test_line_numbers_count_header() {
        let snapshot = decode_csv(SAMPLE.as_bytes()).unwrap();
        let lines: Vec<usize> = snapshot.rows().map(|r| r.line()).collect();
        assert_eq!(lines, vec![2, 3]);
    }

    #[test]
    fn test_bom_is_stripped() {
        let with_bom = format!("\u{feff}{}", SAMPLE);
        let snapshot = decode_csv(with_bom.as_bytes()).unwrap();
        assert_eq!(snapshot.headers()[0], "id");
    }

    #[test]
    fn test_wrong_field_count_is_skipped() {
        let csv = "id;ville\n1;Paris\n2;Lyon;extra\n3;Nice\n";
        let snapshot = decode_csv(csv.as_bytes()).unwrap();
        assert_eq!(snapshot.len(), 2);
        let ids: Vec<_> = snapshot.rows().map(|r| r.get("id").unwrap()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(snapshot.skipped_lines(), &[3]);
    }

    #[test]
    fn test_skipped_line_counts_multiline_records() {
        let csv = "id;adresse\n1;\"a\nb\"\n2;x\n3;y;extra\n";
        let snapshot = decode_csv(csv.as_bytes()).unwrap();
        let lines: Vec<usize> = snapshot.rows().map(|r| r.line()).collect();
        assert_eq!(lines, vec![2, 4]);
        assert_eq!(snapshot.skipped_lines(), &[5]);
    }

    #[test]
    fn test_fields_are_trimmed() {
        let csv = "id;ville\n  42  ;  Versailles \n";
        let snapshot = decode_csv(csv.as_bytes()).unwrap();
        let row = snapshot.rows().next().unwrap();
        assert_eq!(row.get("id"), Some("42"));
        assert_eq!(row.get("ville"), Some("Versailles"));
    }

    #[test]
    fn test_quoted_field_with_delimiter() {
        let csv = "id;adresse\n7;\"12; rue de la Paix\"\n";
        let snapshot = decode_csv(csv.as_bytes()).unwrap();
        let row = snapshot.rows().next().unwrap();
        assert_eq!(row.get("adresse"), Some("12; rue de la Paix"));
    }

    #[test]
    fn test_empty_feed() {
        let snapshot = decode_csv(b"id;ville\n").unwrap();
        assert!(snapshot.is_empty());
        assert!(snapshot.skipped_lines().is_empty());
    }

    #[test]
    fn test_from_rows() {
        let snapshot =
            RawSnapshot::from_rows(&["id", "ville"], &[["1", "Paris"], ["2", "Lyon"]]);
        assert_eq!(snapshot.len(), 2);
        let row = snapshot.rows().nth(1).unwrap();
        assert_eq!(row.get("ville"), Some("Lyon"));
        assert_eq!(row.line(), 3);
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash(b"payload");
        let b = content_hash(b"payload");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
        assert_eq!(a.len(), "sha256:".len() + 64);
        assert_ne!(a, content_hash(b"other"));
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Serves one canned HTTP response on an ephemeral port.
    async fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        });
        format!("http://{addr}/exports/csv")
    }

    // Bypasses any proxy configured in the environment.
    fn local_client() -> FeedClient {
        FeedClient {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
        }
    }

    #[test]
    fn test_feed_client_builds() {
        assert!(FeedClient::new().is_ok());
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_error() {
        let url = serve_once(http_response("404 Not Found", "")).await;
        let err = local_client().fetch_snapshot(&url).await.unwrap_err();
        assert!(err.to_string().contains("404"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_fetch_decodes_body() {
        let url = serve_once(http_response("200 OK", SAMPLE)).await;
        let snapshot = local_client().fetch_snapshot(&url).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.rows().next().unwrap().get("ville"), Some("Paris"));
    }

    #[tokio::test]
    async fn test_load_snapshot_file_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carburants.csv");
        std::fs::write(&path, format!("\u{feff}{}", SAMPLE)).unwrap();

        let snapshot = load_snapshot_file(&path).await.unwrap();
        assert_eq!(snapshot.headers()[0], "id");
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn test_load_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        let err = load_snapshot_file(&path).await.unwrap_err();
        assert!(err.to_string().contains("absent.csv"));
    }
}
