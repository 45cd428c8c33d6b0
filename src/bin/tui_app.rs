use reqwest::{RequestBuilder, Url};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror the server's JSON shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct MoverResponse {
    pub offer_id: String,
    pub offer_name: String,
    pub category: Option<String>,
    pub geo: Option<String>,
    pub payout_type: Option<String>,
    pub payout_value: Option<String>,
    pub acceptance_rate: Option<f64>,
    pub cookie_days: Option<i64>,
    pub listing_date: Option<String>,
    pub epc_start: f64,
    pub epc_end: f64,
    pub delta_abs: f64,
    pub delta_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPoint {
    pub date: String,
    pub epc: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct HistoryResponse {
    pub offer_id: String,
    pub offer_name: String,
    pub category: Option<String>,
    pub geo: Option<String>,
    pub payout_type: Option<String>,
    pub payout_value: Option<String>,
    pub acceptance_rate: Option<f64>,
    pub cookie_days: Option<i64>,
    pub history: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionCounters {
    pub offers_processed: u64,
    pub offers_inserted: u64,
    pub offers_updated: u64,
    pub snapshots_inserted: u64,
    pub snapshots_updated: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    error: String,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub const MOVER_WINDOWS: &[u32] = &[7, 15, 30, 60, 90];
pub const HISTORY_WINDOWS: &[u32] = &[30, 60, 90];
pub const SORT_MODES: &[(&str, &str)] = &[
    ("pct", "Biggest % jump"),
    ("abs", "Biggest $ jump"),
    ("current", "Highest current EPC"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub movers: Vec<MoverResponse>,
    pub history: Option<HistoryResponse>,
    pub window_idx: usize,
    pub sort_idx: usize,
    pub history_window_idx: usize,
    pub search: String,
    /// True while the user is typing into the search box.
    pub editing_search: bool,
    /// One-line result of the last user action (ingest, history load).
    pub notice: Option<String>,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            movers: Vec::new(),
            history: None,
            window_idx: 2,
            sort_idx: 0,
            history_window_idx: 2,
            search: String::new(),
            editing_search: false,
            notice: None,
            base_url,
        }
    }

    pub fn window(&self) -> u32 {
        MOVER_WINDOWS[self.window_idx % MOVER_WINDOWS.len()]
    }

    pub fn history_window(&self) -> u32 {
        HISTORY_WINDOWS[self.history_window_idx % HISTORY_WINDOWS.len()]
    }

    pub fn sort_mode(&self) -> (&'static str, &'static str) {
        SORT_MODES[self.sort_idx % SORT_MODES.len()]
    }

    pub fn cycle_window(&mut self) {
        self.window_idx = (self.window_idx + 1) % MOVER_WINDOWS.len();
    }

    pub fn cycle_sort(&mut self) {
        self.sort_idx = (self.sort_idx + 1) % SORT_MODES.len();
    }

    pub fn cycle_history_window(&mut self) {
        self.history_window_idx = (self.history_window_idx + 1) % HISTORY_WINDOWS.len();
    }

    pub fn movers_request(&self, client: &reqwest::Client) -> RequestBuilder {
        let mut params = vec![
            ("window", self.window().to_string()),
            ("sortMode", self.sort_mode().0.to_string()),
        ];
        let term = self.search.trim();
        if !term.is_empty() {
            params.push(("search", term.to_string()));
        }
        client
            .get(format!("{}/api/top-movers", self.base_url))
            .query(&params)
    }

    /// The offer id travels as a single path segment, so ids containing `/`
    /// or spaces still address one offer.
    pub fn history_request(
        &self,
        client: &reqwest::Client,
        offer_id: &str,
    ) -> Result<RequestBuilder, String> {
        let mut url = Url::parse(&self.base_url).map_err(|e| format!("bad API_URL: {e}"))?;
        url.path_segments_mut()
            .map_err(|_| format!("bad API_URL: {}", self.base_url))?
            .pop_if_empty()
            .extend(["api", "offer", offer_id, "history"]);
        Ok(client.get(url).query(&[("window", self.history_window())]))
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let resp = match self.movers_request(client).send().await {
            Ok(r) => r,
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };
        if !resp.status().is_success() {
            self.status = ConnectionStatus::Error(error_message(resp).await);
            return;
        }
        match resp.json::<Vec<MoverResponse>>().await {
            Ok(movers) => {
                self.movers = movers;
                self.status = ConnectionStatus::Connected;
            }
            Err(e) => self.status = ConnectionStatus::Error(format!("parse error: {e}")),
        }
    }

    /// Load the EPC series for an offer into the detail pane.
    pub async fn fetch_history(&mut self, client: &reqwest::Client, offer_id: &str) {
        let request = match self.history_request(client, offer_id) {
            Ok(r) => r,
            Err(e) => {
                self.notice = Some(e);
                return;
            }
        };
        match request.send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<HistoryResponse>().await {
                Ok(history) => self.history = Some(history),
                Err(e) => self.notice = Some(format!("history parse error: {e}")),
            },
            Ok(resp) => self.notice = Some(error_message(resp).await),
            Err(e) => self.notice = Some(format!("{e}")),
        }
    }

    pub fn clear_history(&mut self) {
        self.history = None;
    }

    /// Ask the server to take a provider snapshot now.
    pub async fn trigger_ingest(&mut self, client: &reqwest::Client) {
        let url = format!("{}/api/fetch-and-snapshot", self.base_url);
        self.notice = Some(match client.post(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<IngestionCounters>().await {
                Ok(c) => format_counters(&c),
                Err(e) => format!("ingest parse error: {e}"),
            },
            Ok(resp) => format!("ingest failed: {}", error_message(resp).await),
            Err(e) => format!("ingest failed: {e}"),
        });
    }
}

async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => format!("HTTP {}: {}", status.as_u16(), body.error),
        Err(_) => format!("HTTP {}", status.as_u16()),
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_epc(v: f64) -> String {
    format!("{v:.2}")
}

pub fn format_delta_abs(v: f64) -> String {
    format!("{v:+.2}")
}

pub fn format_delta_pct(v: f64) -> String {
    if v >= 10_000.0 {
        ">+9999%".to_string()
    } else {
        format!("{v:+.1}%")
    }
}

pub fn format_counters(c: &IngestionCounters) -> String {
    format!(
        "snapshot: {} offers ({} new, {} updated), {} new snapshots, {} overwritten",
        c.offers_processed, c.offers_inserted, c.offers_updated, c.snapshots_inserted, c.snapshots_updated
    )
}

/// Horizontal bar scaled so `max` fills `width` cells.
pub fn bar(v: f64, max: f64, width: usize) -> String {
    if max <= 0.0 || v <= 0.0 {
        return String::new();
    }
    let cells = ((v / max) * width as f64).round() as usize;
    "█".repeat(cells.min(width))
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
