//! Deterministic aggregation of component scores into a recommendation.

use intake_contracts::scoring::Recommendation;

pub const CLINICAL_FIT_WEIGHT: f64 = 0.4;
pub const FINANCIAL_WEIGHT: f64 = 0.3;
pub const OPERATIONAL_WEIGHT: f64 = 0.3;

/// Confidence never exceeds this, however high the score.
pub const MAX_CONFIDENCE: f64 = 0.95;

/// `round(0.4·clinical_fit + 0.3·financial + 0.3·operational)`.
pub fn overall_score(clinical_fit: u8, financial: u8, operational: u8) -> u8 {
    let weighted = CLINICAL_FIT_WEIGHT * f64::from(clinical_fit)
        + FINANCIAL_WEIGHT * f64::from(financial)
        + OPERATIONAL_WEIGHT * f64::from(operational);
    weighted.round().clamp(0.0, 100.0) as u8
}

/// Any deal-breaker declines; otherwise the score picks the band.
pub fn recommendation_for(overall: u8, has_deal_breaker: bool) -> Recommendation {
    if has_deal_breaker {
        return Recommendation::Decline;
    }
    match overall {
        85..=u8::MAX => Recommendation::StrongAccept,
        70..=84 => Recommendation::Accept,
        55..=69 => Recommendation::AcceptWithConditions,
        40..=54 => Recommendation::ReviewRequired,
        _ => Recommendation::Decline,
    }
}

/// `min(0.95, overall/100·0.9 + 0.1)`.
pub fn confidence_for(overall: u8) -> f64 {
    (f64::from(overall) / 100.0 * 0.9 + 0.1).min(MAX_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_overall_rounds() {
        assert_eq!(overall_score(88, 95, 90), 91);
        assert_eq!(overall_score(0, 0, 0), 0);
        assert_eq!(overall_score(100, 100, 100), 100);
        assert_eq!(overall_score(50, 50, 50), 50);
    }

    #[test]
    fn threshold_boundaries() {
        let cases = [
            (39, Recommendation::Decline),
            (40, Recommendation::ReviewRequired),
            (54, Recommendation::ReviewRequired),
            (55, Recommendation::AcceptWithConditions),
            (69, Recommendation::AcceptWithConditions),
            (70, Recommendation::Accept),
            (84, Recommendation::Accept),
            (85, Recommendation::StrongAccept),
            (100, Recommendation::StrongAccept),
        ];
        for (score, expected) in cases {
            assert_eq!(recommendation_for(score, false), expected, "score {score}");
        }
    }

    #[test]
    fn deal_breaker_dominates_any_score() {
        for score in [0, 55, 85, 100] {
            assert_eq!(recommendation_for(score, true), Recommendation::Decline);
        }
    }

    #[test]
    fn confidence_is_capped() {
        assert!((confidence_for(91) - 0.919).abs() < 1e-9);
        assert!((confidence_for(0) - 0.1).abs() < 1e-9);
        assert_eq!(confidence_for(100), MAX_CONFIDENCE);
        assert_eq!(confidence_for(95), MAX_CONFIDENCE);
    }
}
