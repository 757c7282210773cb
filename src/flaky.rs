use indexmap::IndexSet;
use log::{info, warn};
use reqwest::Client;
use url::Url;

use crate::error::{BuildGateError, Result};

/// Ordered set of historically-flaky test names, fetched once per run.
///
/// `effective_attempts` is the retry budget actually honored: it collapses
/// to 1 whenever the list could not be fetched, so a broken flaky service
/// degrades the run to no-retries instead of failing it.
#[derive(Debug, Clone)]
pub struct FlakyTestList {
    pub tests: IndexSet<String>,
    pub effective_attempts: u32,
}

impl FlakyTestList {
    pub fn disabled() -> Self {
        Self {
            tests: IndexSet::new(),
            effective_attempts: 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Anchored exact-match alternation for the test tool's retry filter,
    /// e.g. `^(client-test|tablet_server-test)$`. Returns None when there
    /// is nothing to retry.
    pub fn retry_filter(&self) -> Option<String> {
        if self.tests.is_empty() || self.effective_attempts <= 1 {
            return None;
        }
        let alternation = self
            .tests
            .iter()
            .map(|name| escape_pattern(name))
            .collect::<Vec<_>>()
            .join("|");
        Some(format!("^({alternation})$"))
    }
}

/// Escape regex metacharacters so test names match literally.
fn escape_pattern(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for ch in name.chars() {
        if matches!(
            ch,
            '.' | '+' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Fetch the flaky-test list when retries are requested.
///
/// `attempts <= 1` is the no-op fast path: no network access at all.
/// Requesting retries without a configured server is a configuration
/// error and aborts the run; a configured server that fails to answer
/// only degrades the run to `attempts = 1`.
pub async fn maybe_fetch(attempts: u32, server: Option<&str>) -> Result<FlakyTestList> {
    if attempts <= 1 {
        return Ok(FlakyTestList::disabled());
    }

    let Some(server) = server else {
        return Err(BuildGateError::Config(format!(
            "flaky retries requested (attempts={attempts}) but no flaky server is configured"
        )));
    };

    match fetch_list(server).await {
        Ok(tests) => {
            info!("Fetched {} known-flaky tests from {server}", tests.len());
            Ok(FlakyTestList {
                tests,
                effective_attempts: attempts,
            })
        }
        Err(err) => {
            warn!("Failed to fetch flaky-test list from {server}: {err}; disabling retries");
            Ok(FlakyTestList::disabled())
        }
    }
}

/// Build the list endpoint from the configured server address. A scheme
/// is optional, and a non-slash-terminated base path is preserved rather
/// than replaced by the join.
fn endpoint_url(server: &str) -> Result<Url> {
    let mut base = if server.contains("://") {
        server.to_string()
    } else {
        format!("http://{server}")
    };
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|u| u.join("list_failed_tests"))
        .map_err(|e| BuildGateError::Config(format!("Invalid flaky server address: {e}")))
}

async fn fetch_list(server: &str) -> Result<IndexSet<String>> {
    let url = endpoint_url(server)?;

    let client = Client::builder()
        .user_agent(concat!("buildgate/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let body = client
        .get(url)
        .query(&[("days", "7")])
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    Ok(parse_list(&body))
}

/// Parse the newline-delimited response body. Blank lines are skipped and
/// duplicates collapse while preserving first-seen order.
fn parse_list(body: &str) -> IndexSet<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
