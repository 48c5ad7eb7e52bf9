//! P2P marketplace advert search client.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, ORIGIN, REFERER};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use tasa_common::time::{constants, DurationExt};

use crate::error::{QuoteError, QuoteResult};
use crate::source::{QuoteRequest, QuoteSource};

/// Default advert search endpoint.
pub const DEFAULT_MARKET_URL: &str = "https://p2p.binance.com/bapi/c2c/v2/friendly/c2c/adv/search";
const MARKET_ORIGIN: &str = "https://p2p.binance.com";
const USER_AGENT: &str = concat!("tasa/", env!("CARGO_PKG_VERSION"));
/// Adverts requested per filter when validating a tracked pair.
const VALIDATION_ROWS: u32 = 5;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct P2pMarketConfig {
    pub url: String,
    /// Adverts requested per query.
    pub rows: u32,
    pub timeout: Duration,
}

impl Default for P2pMarketConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MARKET_URL.to_string(),
            rows: 20,
            timeout: constants::default_quote_timeout().as_std(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdvSearchRequest<'a> {
    page: u32,
    rows: u32,
    pay_types: &'a [String],
    asset: &'a str,
    fiat: &'a str,
    trade_type: &'static str,
    #[serde(with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    trans_amount: Option<Decimal>,
    publisher_type: Option<String>,
    countries: Vec<String>,
    pro_merchant_ads: bool,
    filter_type: &'static str,
}

impl<'a> AdvSearchRequest<'a> {
    /// Search for `request`, restricted to `pay_types`. A zero probe amount
    /// leaves the amount out.
    fn new(request: &'a QuoteRequest, pay_types: &'a [String], rows: u32) -> Self {
        Self {
            page: 1,
            rows,
            pay_types,
            asset: request.key.crypto.as_str(),
            fiat: request.key.fiat.as_str(),
            trade_type: request.key.direction.as_trade_type(),
            trans_amount: (request.probe_amount > Decimal::ZERO).then_some(request.probe_amount),
            publisher_type: None,
            countries: Vec::new(),
            pro_merchant_ads: false,
            filter_type: "all",
        }
    }
}

#[derive(Debug, Deserialize)]
struct AdvSearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Vec<AdvEntry>>,
}

#[derive(Debug, Deserialize)]
struct AdvEntry {
    adv: Adv,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Adv {
    price: String,
    tradable_quantity: String,
}

/// Price of the first advert with tradable quantity.
fn representative_price(response: AdvSearchResponse) -> QuoteResult<Decimal> {
    if !response.success {
        let reason = response
            .message
            .or(response.code)
            .unwrap_or_else(|| "unsuccessful response".to_string());
        return Err(QuoteError::Rejected(reason));
    }

    let adverts = response.data.unwrap_or_default();
    let advert = adverts
        .iter()
        .find(|entry| {
            Decimal::from_str(&entry.adv.tradable_quantity)
                .map(|q| q > Decimal::ZERO)
                .unwrap_or(false)
        })
        .ok_or(QuoteError::NoAdverts)?;

    Decimal::from_str(&advert.adv.price).map_err(|_| QuoteError::InvalidPrice(advert.adv.price.clone()))
}

/// Which filters of a tracked pair have tradable adverts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackingValidation {
    pub valid_filters: Vec<String>,
    pub invalid_filters: Vec<String>,
}

impl TrackingValidation {
    /// Classify one filter's search outcome.
    ///
    /// A rejected query or an empty book marks the filter invalid; transport
    /// failures say nothing about the filter and are returned.
    fn record(&mut self, filter: &str, outcome: QuoteResult<Decimal>) -> QuoteResult<()> {
        match outcome {
            Ok(_) => self.valid_filters.push(filter.to_string()),
            Err(QuoteError::Rejected(_) | QuoteError::NoAdverts | QuoteError::InvalidPrice(_)) => {
                self.invalid_filters.push(filter.to_string())
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// At least one filter can be quoted.
    pub fn is_valid(&self) -> bool {
        !self.valid_filters.is_empty()
    }
}

/// HTTP quote source for the P2P advert search endpoint.
#[derive(Debug, Clone)]
pub struct P2pMarketClient {
    client: Client,
    config: P2pMarketConfig,
}

impl P2pMarketClient {
    /// Create a client.
    pub fn new(config: P2pMarketConfig) -> QuoteResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ORIGIN, HeaderValue::from_static(MARKET_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static("https://p2p.binance.com/"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| QuoteError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &P2pMarketConfig {
        &self.config
    }

    /// Check each filter of a tracked pair on its own with a small search.
    #[instrument(skip(self, request), fields(query = %request.key))]
    pub async fn validate_tracking(&self, request: &QuoteRequest) -> QuoteResult<TrackingValidation> {
        let mut validation = TrackingValidation::default();
        for filter in &request.filter_set {
            let pay_types = std::slice::from_ref(filter);
            let outcome = self
                .search(&AdvSearchRequest::new(request, pay_types, VALIDATION_ROWS))
                .await;
            validation.record(filter, outcome)?;
        }

        info!(
            valid = validation.valid_filters.len(),
            invalid = validation.invalid_filters.len(),
            "Tracking filters checked"
        );
        Ok(validation)
    }

    async fn search(&self, payload: &AdvSearchRequest<'_>) -> QuoteResult<Decimal> {
        let response = self.client.post(&self.config.url).json(payload).send().await?;

        if !response.status().is_success() {
            return Err(QuoteError::Status(response.status().as_u16()));
        }

        let body: AdvSearchResponse = response.json().await?;
        representative_price(body)
    }
}

#[async_trait]
impl QuoteSource for P2pMarketClient {
    fn name(&self) -> &str {
        "p2p_market"
    }

    #[instrument(skip(self, request), fields(query = %request.key))]
    async fn fetch_quote(&self, request: &QuoteRequest) -> QuoteResult<Decimal> {
        let payload = AdvSearchRequest::new(request, &request.filter_set, self.config.rows);
        let price = self.search(&payload).await?;

        debug!(price = %price, "Marketplace quote received");
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tasa_common::{CurrencySymbol, Direction, QuoteKey};

    fn parse(json: &str) -> AdvSearchResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_first_tradable_advert_wins() {
        let response = parse(
            r#"{
                "code": "000000",
                "success": true,
                "data": [
                    {"adv": {"price": "39.90", "tradableQuantity": "0.00"}},
                    {"adv": {"price": "40.12", "tradableQuantity": "125.5"}},
                    {"adv": {"price": "40.50", "tradableQuantity": "300"}}
                ]
            }"#,
        );
        assert_eq!(representative_price(response).unwrap(), dec!(40.12));
    }

    #[test]
    fn test_unsuccessful_envelope() {
        let response = parse(r#"{"code": "083999", "message": "bad fiat", "success": false}"#);
        assert_eq!(
            representative_price(response),
            Err(QuoteError::Rejected("bad fiat".to_string()))
        );
    }

    #[test]
    fn test_no_tradable_adverts() {
        let response = parse(r#"{"success": true, "data": []}"#);
        assert_eq!(representative_price(response), Err(QuoteError::NoAdverts));

        let drained = parse(r#"{"success": true, "data": [{"adv": {"price": "1", "tradableQuantity": "0"}}]}"#);
        assert_eq!(representative_price(drained), Err(QuoteError::NoAdverts));
    }

    #[test]
    fn test_unparseable_price() {
        let response = parse(r#"{"success": true, "data": [{"adv": {"price": "n/a", "tradableQuantity": "5"}}]}"#);
        assert!(matches!(
            representative_price(response),
            Err(QuoteError::InvalidPrice(_))
        ));
    }

    fn request(probe_amount: Decimal) -> QuoteRequest {
        let key = QuoteKey::new(
            CurrencySymbol::parse("VES").unwrap(),
            CurrencySymbol::parse("USDT").unwrap(),
            Direction::Sell,
        );
        QuoteRequest::new(key, vec!["BANK".to_string(), "SpecificBank".to_string()], probe_amount)
    }

    #[test]
    fn test_request_payload_shape() {
        let request = request(dec!(20000.5));
        let payload = AdvSearchRequest::new(&request, &request.filter_set, 20);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["asset"], "USDT");
        assert_eq!(json["fiat"], "VES");
        assert_eq!(json["tradeType"], "SELL");
        assert_eq!(json["payTypes"][1], "SpecificBank");
        assert_eq!(json["transAmount"], serde_json::json!(20000.5));
        assert!(json["publisherType"].is_null());
        assert_eq!(json["proMerchantAds"], false);
    }

    #[test]
    fn test_zero_amount_is_left_out() {
        let request = request(Decimal::ZERO);
        let payload = AdvSearchRequest::new(&request, &request.filter_set, 20);

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("transAmount").is_none());
    }

    #[test]
    fn test_validation_search_uses_one_filter() {
        let request = request(dec!(20000));
        let payload = AdvSearchRequest::new(&request, std::slice::from_ref(&request.filter_set[1]), VALIDATION_ROWS);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["rows"], 5);
        assert_eq!(json["payTypes"], serde_json::json!(["SpecificBank"]));
    }

    #[test]
    fn test_tracking_validation_classifies_filters() {
        let mut validation = TrackingValidation::default();
        assert!(!validation.is_valid());

        validation.record("BANK", Ok(dec!(40))).unwrap();
        validation.record("Ghost", Err(QuoteError::NoAdverts)).unwrap();
        validation
            .record("Typo", Err(QuoteError::Rejected("bad pay type".to_string())))
            .unwrap();

        assert!(validation.is_valid());
        assert_eq!(validation.valid_filters, vec!["BANK"]);
        assert_eq!(validation.invalid_filters, vec!["Ghost", "Typo"]);
    }

    #[test]
    fn test_tracking_validation_surfaces_transport_errors() {
        let mut validation = TrackingValidation::default();
        let err = validation.record("BANK", Err(QuoteError::Status(503)));
        assert_eq!(err, Err(QuoteError::Status(503)));
        assert!(validation.valid_filters.is_empty() && validation.invalid_filters.is_empty());
    }

    #[test]
    fn test_client_builds_with_defaults() {
        let client = P2pMarketClient::new(P2pMarketConfig::default()).unwrap();
        assert_eq!(client.config().rows, 20);
        assert_eq!(client.name(), "p2p_market");
    }
}
