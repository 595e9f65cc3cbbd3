use serde::{Deserialize, Serialize};

/// Findings at or above this score are surfaced as compiler warnings.
pub const HIGH_RISK_THRESHOLD: u8 = 7;

/// One result of the advisory security analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub line: u32,
    /// 1 (informational) to 10 (critical).
    pub risk_score: u8,
    pub category: String,
    pub description: String,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl Finding {
    pub fn is_high_risk(&self) -> bool {
        self.risk_score >= HIGH_RISK_THRESHOLD
    }

    /// `Line N: description`, the form appended to compiler warnings.
    pub fn warning_line(&self) -> String {
        format!("Line {}: {}", self.line, self.description)
    }
}

/// Mean finding score rounded to two decimals; `None` without findings.
pub fn aggregate_risk(findings: &[Finding]) -> Option<f64> {
    if findings.is_empty() {
        return None;
    }
    let total: f64 = findings.iter().map(|f| f64::from(f.risk_score)).sum();
    let mean = total / findings.len() as f64;
    Some((mean * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(line: u32, risk_score: u8) -> Finding {
        Finding {
            line,
            risk_score,
            category: "Privilege Escalation".into(),
            description: format!("finding at {}", line),
            recommendation: "narrow the grant".into(),
            raw_output: None,
        }
    }

    #[test]
    fn aggregate_is_rounded_mean() {
        let findings = vec![finding(1, 9), finding(2, 4), finding(3, 4)];
        assert_eq!(aggregate_risk(&findings), Some(5.67));
        assert_eq!(aggregate_risk(&[]), None);
    }

    #[test]
    fn high_risk_threshold_is_inclusive() {
        assert!(finding(1, 7).is_high_risk());
        assert!(!finding(1, 6).is_high_risk());
        assert_eq!(finding(12, 8).warning_line(), "Line 12: finding at 12");
    }
}
