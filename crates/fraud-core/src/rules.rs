//! Rule catalogues backing the "rule overlay" half of each detector. Every
//! rule carries a fixed weight and an explicit hard/soft classification; hard
//! rules are never diluted by blending with the model probability (see
//! `detectors::blend`).

use crate::types::TransactionRequest;

pub struct Rule {
    pub name: &'static str,
    pub weight: f64,
    pub hard: bool,
    matcher: fn(&TransactionRequest) -> bool,
}

impl Rule {
    pub fn matches(&self, request: &TransactionRequest) -> bool {
        (self.matcher)(request)
    }
}

fn contains_phone_and_callback(memo: &str) -> bool {
    let lower = memo.to_lowercase();
    let has_digits_run = lower
        .as_bytes()
        .windows(8)
        .any(|w| w.iter().filter(|b| b.is_ascii_digit()).count() >= 7);
    has_digits_run && lower.contains("call back")
}

fn contains_otp_share(memo: &str) -> bool {
    let lower = memo.to_lowercase();
    lower.contains("otp") && (lower.contains("share") || lower.contains("tell"))
}

fn contains_shortener(memo: &str) -> bool {
    const HOSTS: &[&str] = &["bit.ly", "tinyurl.com", "t.co", "goo.gl", "is.gd", "cutt.ly"];
    let lower = memo.to_lowercase();
    HOSTS.iter().any(|h| lower.contains(h))
}

pub fn phishing_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "known_shortener_host",
            weight: 0.9,
            hard: true,
            matcher: |r| contains_shortener(&r.message),
        },
        Rule {
            name: "phone_with_callback",
            weight: 0.85,
            hard: true,
            matcher: |r| contains_phone_and_callback(&r.message),
        },
        Rule {
            name: "otp_share_request",
            weight: 0.9,
            hard: true,
            matcher: |r| contains_otp_share(&r.message),
        },
        Rule {
            name: "urgency_language",
            weight: 0.3,
            hard: false,
            matcher: |r| {
                let lower = r.message.to_lowercase();
                ["urgent", "immediately", "blocked", "verify"]
                    .iter()
                    .any(|w| lower.contains(w))
            },
        },
        Rule {
            name: "reward_lottery_language",
            weight: 0.25,
            hard: false,
            matcher: |r| {
                let lower = r.message.to_lowercase();
                lower.contains("reward") || lower.contains("lottery") || lower.contains("prize")
            },
        },
    ]
}

fn qr_host(payload: &str) -> String {
    let without_scheme = payload.split("://").nth(1).unwrap_or(payload);
    without_scheme.split(['/', '?']).next().unwrap_or("").to_lowercase()
}

fn qr_is_ip_literal(payload: &str) -> bool {
    let host = qr_host(payload);
    host.split('.').count() == 4 && host.split('.').all(|p| p.parse::<u8>().is_ok())
}

fn qr_param<'a>(payload: &'a str, key: &str) -> Option<&'a str> {
    payload.split(['&', '?']).find_map(|kv| {
        let mut parts = kv.splitn(2, '=');
        let k = parts.next()?;
        let v = parts.next()?;
        (k == key).then_some(v)
    })
}

pub fn qr_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "qr_payee_mismatch",
            weight: 0.95,
            hard: true,
            matcher: |r| {
                let payload = match &r.qr_payload {
                    Some(p) => p,
                    None => return false,
                };
                match qr_param(payload, "pa") {
                    Some(encoded) => encoded != r.payee_vpa,
                    None => false,
                }
            },
        },
        Rule {
            name: "qr_amount_mismatch",
            weight: 0.95,
            hard: true,
            matcher: |r| {
                let payload = match &r.qr_payload {
                    Some(p) => p,
                    None => return false,
                };
                let encoded: Option<f64> = qr_param(payload, "am").and_then(|s| s.parse().ok());
                match encoded {
                    Some(amt) if r.amount > 0.0 => ((amt - r.amount).abs() / r.amount) > 0.01,
                    Some(amt) => amt > 0.0,
                    None => false,
                }
            },
        },
        Rule {
            name: "qr_non_upi_scheme",
            weight: 0.8,
            hard: true,
            matcher: |r| match &r.qr_payload {
                Some(p) if !p.is_empty() => !p.starts_with("upi:"),
                _ => false,
            },
        },
        Rule {
            name: "qr_ip_literal_host",
            weight: 0.9,
            hard: true,
            matcher: |r| match &r.qr_payload {
                Some(p) if !p.is_empty() => qr_is_ip_literal(p),
                _ => false,
            },
        },
    ]
}

pub fn collect_rules(large_amount_threshold: f64) -> Vec<Rule> {
    vec![
        Rule {
            name: "large_new_payee_collect",
            weight: 0.9,
            hard: true,
            matcher: move |r| {
                r.transaction_type == crate::types::TransactionType::Collect
                    && r.payee_new
                    && r.amount >= large_amount_threshold
            },
        },
        Rule {
            name: "collect_reward_language",
            weight: 0.3,
            hard: false,
            matcher: |r| {
                let lower = r.message.to_lowercase();
                lower.contains("prize") || lower.contains("claim") || lower.contains("reward")
            },
        },
        Rule {
            name: "collect_new_payee",
            weight: 0.2,
            hard: false,
            matcher: |r| {
                r.transaction_type == crate::types::TransactionType::Collect && r.payee_new
            },
        },
    ]
}

pub fn malware_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "debugger_attached",
            weight: 0.9,
            hard: true,
            matcher: |r| r.device_posture.as_ref().is_some_and(|p| p.debugger_attached),
        },
        Rule {
            name: "sideload_with_accessibility",
            weight: 0.9,
            hard: true,
            matcher: |r| {
                r.device_posture
                    .as_ref()
                    .is_some_and(|p| p.recent_sideload && p.accessibility_service_active)
            },
        },
        Rule {
            name: "screen_overlay_active",
            weight: 0.35,
            hard: false,
            matcher: |r| r.device_posture.as_ref().is_some_and(|p| p.screen_overlay_active),
        },
        Rule {
            name: "suspicious_app_flag",
            weight: 0.3,
            hard: false,
            matcher: |r| r.device_posture.as_ref().is_some_and(|p| p.suspicious_app_flag),
        },
    ]
}

/// `p_rules = clamp(sum(weight_of(r) for r in rule_hits), 0, 1)`
pub fn rule_probability(rules: &[Rule], request: &TransactionRequest) -> (f64, Vec<String>, bool) {
    let mut hits = Vec::new();
    let mut sum = 0.0;
    let mut any_hard = false;
    for rule in rules {
        if rule.matches(request) {
            hits.push(rule.name.to_string());
            sum += rule.weight;
            any_hard = any_hard || rule.hard;
        }
    }
    (sum.clamp(0.0, 1.0), hits, any_hard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DevicePosture, TransactionType};

    fn base() -> TransactionRequest {
        TransactionRequest {
            transaction_id: "t1".to_string(),
            payer_vpa: "alice@bank".to_string(),
            payee_vpa: "alice@bank".to_string(),
            amount: 100.0,
            message: String::new(),
            transaction_type: TransactionType::Pay,
            qr_payload: None,
            payee_new: false,
            device_posture: None,
        }
    }

    #[test]
    fn phishing_hard_rule_fires_on_shortener() {
        let mut r = base();
        r.message = "tap bit.ly/abc now".to_string();
        let (p, hits, hard) = rule_probability(&phishing_rules(), &r);
        assert!(hard);
        assert!(p > 0.0);
        assert!(hits.contains(&"known_shortener_host".to_string()));
    }

    #[test]
    fn qr_mismatch_rules_fire() {
        let mut r = base();
        r.amount = 100.0;
        r.qr_payload = Some("upi://pay?pa=mallory@bank&am=1000".to_string());
        let (_, hits, hard) = rule_probability(&qr_rules(), &r);
        assert!(hard);
        assert!(hits.contains(&"qr_payee_mismatch".to_string()));
        assert!(hits.contains(&"qr_amount_mismatch".to_string()));
    }

    #[test]
    fn malware_debugger_rule_is_hard() {
        let mut r = base();
        r.device_posture = Some(DevicePosture {
            debugger_attached: true,
            ..Default::default()
        });
        let (_, hits, hard) = rule_probability(&malware_rules(), &r);
        assert!(hard);
        assert!(hits.contains(&"debugger_attached".to_string()));
    }
}
