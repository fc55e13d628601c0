//! Feature extraction: total functions turning a request into the fixed-length
//! numeric vector each detector's model was trained against. Absent fields map
//! to a neutral value (0 for counts, empty for strings, false for booleans);
//! none of these functions can fail.

use std::collections::BTreeMap;

use crate::types::{DevicePosture, TransactionRequest, TransactionType};

const URGENCY_LEXICON: &[&str] = &[
    "urgent", "immediately", "verify", "kyc", "blocked", "refund", "reward", "lottery", "otp",
];

const URL_SHORTENERS: &[&str] = &["bit.ly", "tinyurl.com", "t.co", "goo.gl", "is.gd", "cutt.ly"];

/// Named, weighted numeric feature vector. Preserves insertion order so the
/// explainer can report the top contributors deterministically.
#[derive(Debug, Clone, Default)]
pub struct FeatureVector {
    values: Vec<(String, f64)>,
}

impl FeatureVector {
    fn push(&mut self, name: &str, value: f64) {
        self.values.push((name.to_string(), value));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, f64)> {
        self.values.iter()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// Top-N features by absolute value, preserving relative order among ties.
    pub fn top(&self, n: usize) -> Vec<(String, f64)> {
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(std::cmp::Ordering::Equal));
        sorted.truncate(n);
        sorted
    }
}

fn count_urls(text: &str) -> usize {
    text.split_whitespace()
        .filter(|tok| tok.contains("://") || tok.contains("www.") || tok.contains(".com") || tok.contains(".in"))
        .count()
}

fn has_known_shortener(text: &str) -> bool {
    let lower = text.to_lowercase();
    URL_SHORTENERS.iter().any(|host| lower.contains(host))
}

fn uppercase_fraction(text: &str) -> f64 {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0.0;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64
}

fn has_obfuscated_digits(text: &str) -> bool {
    // Homoglyph/obfuscation heuristic: digits interleaved with punctuation
    // inside an otherwise alphabetic run, e.g. "0TP" or "KYC-1D".
    let chars: Vec<char> = text.chars().collect();
    chars.windows(3).any(|w| {
        w[0].is_alphabetic() && w[1].is_ascii_digit() && w[2].is_alphabetic()
    })
}

fn amount_bucket(amount: f64) -> f64 {
    match amount {
        a if a <= 0.0 => 0.0,
        a if a < 500.0 => 1.0,
        a if a < 5_000.0 => 2.0,
        a if a < 50_000.0 => 3.0,
        _ => 4.0,
    }
}

pub fn phishing_features(request: &TransactionRequest) -> FeatureVector {
    let mut v = FeatureVector::default();
    let memo = request.message.to_lowercase();
    let hits = URGENCY_LEXICON.iter().filter(|w| memo.contains(*w)).count();
    v.push("urgency_lexicon_hits", hits as f64);
    v.push("url_count", count_urls(&request.message) as f64);
    v.push("has_known_shortener", has_known_shortener(&request.message) as u8 as f64);
    v.push("uppercase_fraction", uppercase_fraction(&request.message));
    v.push("has_obfuscated_digits", has_obfuscated_digits(&request.message) as u8 as f64);
    v.push("amount_bucket", amount_bucket(request.amount));
    v
}

fn url_host(payload: &str) -> String {
    let without_scheme = payload.split("://").nth(1).unwrap_or(payload);
    without_scheme.split(['/', '?']).next().unwrap_or("").to_lowercase()
}

fn is_ip_literal(host: &str) -> bool {
    host.split('.').count() == 4 && host.split('.').all(|part| part.parse::<u8>().is_ok())
}

fn parse_qr_param<'a>(payload: &'a str, key: &str) -> Option<&'a str> {
    payload.split(['&', '?']).find_map(|kv| {
        let mut parts = kv.splitn(2, '=');
        let k = parts.next()?;
        let v = parts.next()?;
        if k == key {
            Some(v)
        } else {
            None
        }
    })
}

fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts: BTreeMap<char, usize> = BTreeMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }
    let len = s.len() as f64;
    -counts
        .values()
        .map(|&n| {
            let p = n as f64 / len;
            p * p.log2()
        })
        .sum::<f64>()
}

pub fn qr_features(request: &TransactionRequest) -> FeatureVector {
    let mut v = FeatureVector::default();
    let payload = request.qr_payload.clone().unwrap_or_default();

    let scheme_is_upi = payload.starts_with("upi:");
    v.push("scheme_is_upi", scheme_is_upi as u8 as f64);

    let host = url_host(&payload);
    v.push("host_is_ip_literal", is_ip_literal(&host) as u8 as f64);

    let encoded_payee = parse_qr_param(&payload, "pa").unwrap_or("");
    let payee_mismatch = !encoded_payee.is_empty() && encoded_payee != request.payee_vpa;
    v.push("payee_mismatch", payee_mismatch as u8 as f64);

    let encoded_amount: Option<f64> = parse_qr_param(&payload, "am").and_then(|s| s.parse().ok());
    let amount_mismatch_pct = match encoded_amount {
        Some(encoded) if request.amount > 0.0 => ((encoded - request.amount).abs() / request.amount) * 100.0,
        Some(encoded) if encoded > 0.0 => 100.0,
        _ => 0.0,
    };
    v.push("amount_mismatch_pct", amount_mismatch_pct);

    let non_standard_params = payload
        .split(['&', '?'])
        .filter(|kv| {
            let key = kv.split('=').next().unwrap_or("");
            !key.is_empty() && !matches!(key, "pa" | "am" | "pn" | "cu" | "tn")
        })
        .count();
    v.push("non_standard_param_count", non_standard_params as f64);

    v.push("payload_length", payload.len() as f64);
    v.push("payload_entropy", shannon_entropy(&payload));
    v
}

fn is_off_hours(now: chrono::DateTime<chrono::Utc>) -> bool {
    use chrono::{Datelike, Timelike, Weekday};
    let weekend = matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
    let hour = now.hour();
    weekend || !(9..21).contains(&hour)
}

const MERCHANT_KEYWORDS: &[&str] = &["invoice", "bill", "subscription", "merchant", "order"];

pub fn collect_features(request: &TransactionRequest) -> FeatureVector {
    let mut v = FeatureVector::default();
    v.push(
        "is_collect",
        (request.transaction_type == TransactionType::Collect) as u8 as f64,
    );
    v.push("payee_new", request.payee_new as u8 as f64);
    v.push("amount_zscore_bucket", amount_bucket(request.amount));
    let memo = request.message.to_lowercase();
    let merchant_hits = MERCHANT_KEYWORDS.iter().filter(|w| memo.contains(*w)).count();
    v.push("merchant_keyword_hits", merchant_hits as f64);
    v.push("off_hours", is_off_hours(chrono::Utc::now()) as u8 as f64);
    v
}

fn app_count_bucket(count: u32) -> f64 {
    match count {
        0..=20 => 0.0,
        21..=60 => 1.0,
        61..=150 => 2.0,
        _ => 3.0,
    }
}

pub fn malware_features(request: &TransactionRequest) -> FeatureVector {
    let mut v = FeatureVector::default();
    let posture = request.device_posture.clone().unwrap_or_default();
    let DevicePosture {
        installed_app_count,
        suspicious_app_flag,
        accessibility_service_active,
        screen_overlay_active,
        debugger_attached,
        recent_sideload,
    } = posture;
    v.push("suspicious_app_flag", suspicious_app_flag as u8 as f64);
    v.push("accessibility_service_active", accessibility_service_active as u8 as f64);
    v.push("screen_overlay_active", screen_overlay_active as u8 as f64);
    v.push("debugger_attached", debugger_attached as u8 as f64);
    v.push("recent_sideload", recent_sideload as u8 as f64);
    v.push("installed_app_count_bucket", app_count_bucket(installed_app_count));
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionRequest;

    fn base_request() -> TransactionRequest {
        TransactionRequest {
            transaction_id: "t1".to_string(),
            payer_vpa: "alice@bank".to_string(),
            payee_vpa: "bob@bank".to_string(),
            amount: 500.0,
            message: String::new(),
            transaction_type: TransactionType::Pay,
            qr_payload: None,
            payee_new: false,
            device_posture: None,
        }
    }

    #[test]
    fn absent_fields_yield_neutral_vectors() {
        let request = base_request();
        let phishing = phishing_features(&request);
        assert_eq!(phishing.get("urgency_lexicon_hits"), Some(0.0));
        let qr = qr_features(&request);
        assert_eq!(qr.get("payee_mismatch"), Some(0.0));
        let malware = malware_features(&request);
        assert_eq!(malware.get("debugger_attached"), Some(0.0));
    }

    #[test]
    fn phishing_detects_urgency_and_shortener() {
        let mut request = base_request();
        request.message = "URGENT: verify KYC, share OTP, tap bit.ly/abc".to_string();
        let features = phishing_features(&request);
        assert!(features.get("urgency_lexicon_hits").unwrap() >= 2.0);
        assert_eq!(features.get("has_known_shortener"), Some(1.0));
    }

    #[test]
    fn qr_detects_payee_and_amount_mismatch() {
        let mut request = base_request();
        request.payee_vpa = "alice@bank".to_string();
        request.amount = 100.0;
        request.qr_payload = Some("upi://pay?pa=mallory@bank&am=1000".to_string());
        let features = qr_features(&request);
        assert_eq!(features.get("payee_mismatch"), Some(1.0));
        assert!(features.get("amount_mismatch_pct").unwrap() > 1.0);
    }
}
