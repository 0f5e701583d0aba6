/// models/rsi.rs — Relative Strength Index (Wilder)
///
///   gain_t = max(C_t − C_{t−1}, 0),  loss_t = max(C_{t−1} − C_t, 0)
///   first averages: simple mean of the first n gains / losses
///   then: avg_t = (avg_{t−1}·(n − 1) + x_t) / n
///   RSI = 100 − 100 / (1 + avg_gain/avg_loss)   (100 when avg_loss = 0)

/// Oldest-first RSI values aligned with `closes`; first value on bar `period`.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }
    let n = period as f64;

    let (mut avg_gain, mut avg_loss) = (0.0, 0.0);
    for i in 1..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if i <= period {
            avg_gain += gain / n;
            avg_loss += loss / n;
            if i < period {
                continue;
            }
        } else {
            avg_gain = (avg_gain * (n - 1.0) + gain) / n;
            avg_loss = (avg_loss * (n - 1.0) + loss) / n;
        }

        out[i] = Some(if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_gains_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_eq!(rsi_series(&closes, 14)[19], Some(100.0));
    }

    #[test]
    fn all_losses_is_0() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi_series(&closes, 14)[19], Some(0.0));
    }

    #[test]
    fn alternating_is_balanced() {
        let closes: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 1.0 } else { 2.0 }).collect();
        // 14 changes: 7 up, 7 down of equal size
        let v = rsi_series(&closes, 14)[14].unwrap();
        assert!((v - 50.0).abs() < 1e-9, "rsi = {v}");
    }

    #[test]
    fn nothing_before_period() {
        let closes = [1.0, 1.1, 1.2];
        assert!(rsi_series(&closes, 3).iter().all(Option::is_none));
    }
}
