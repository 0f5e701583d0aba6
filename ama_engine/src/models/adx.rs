/// models/adx.rs — Average Directional Index (Wilder)
///
///   TR_t  = max(H_t − L_t, |H_t − C_{t−1}|, |L_t − C_{t−1}|)
///   +DM_t = H_t − H_{t−1}  if it exceeds L_{t−1} − L_t and is positive, else 0
///   −DM_t = L_{t−1} − L_t  if it exceeds H_t − H_{t−1} and is positive, else 0
///
///   Wilder smoothing over n bars (first value = plain sum):
///       S_t = S_{t−1} − S_{t−1}/n + x_t
///
///   +DI = 100·S(+DM)/S(TR),  −DI = 100·S(−DM)/S(TR)
///   DX  = 100·|+DI − −DI| / (+DI + −DI)
///   ADX = mean of the first n DX values, then (ADX_{t−1}·(n−1) + DX_t)/n
///
/// First ADX value lands on bar 2n − 1.
use crate::models::Kline;

/// Oldest-first ADX values aligned with `bars`.
pub fn adx_series(bars: &[Kline], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() < 2 * period {
        return out;
    }
    let n = period as f64;

    let mut tr_s    = 0.0;
    let mut plus_s  = 0.0;
    let mut minus_s = 0.0;
    let mut dx_sum  = 0.0;
    let mut adx: Option<f64> = None;

    for i in 1..bars.len() {
        let (cur, prev) = (&bars[i], &bars[i - 1]);
        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        let up   = cur.high - prev.high;
        let down = prev.low - cur.low;
        let plus_dm  = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };

        if i <= period {
            tr_s    += tr;
            plus_s  += plus_dm;
            minus_s += minus_dm;
            if i < period {
                continue;
            }
        } else {
            tr_s    = tr_s - tr_s / n + tr;
            plus_s  = plus_s - plus_s / n + plus_dm;
            minus_s = minus_s - minus_s / n + minus_dm;
        }

        let dx = directional_index(plus_s, minus_s, tr_s);

        match adx {
            None if i < 2 * period - 1 => dx_sum += dx,
            None => {
                dx_sum += dx;
                adx = Some(dx_sum / n);
            }
            Some(prev_adx) => adx = Some((prev_adx * (n - 1.0) + dx) / n),
        }
        out[i] = adx;
    }
    out
}

fn directional_index(plus_s: f64, minus_s: f64, tr_s: f64) -> f64 {
    if tr_s <= 0.0 {
        return 0.0;
    }
    let plus_di  = 100.0 * plus_s / tr_s;
    let minus_di = 100.0 * minus_s / tr_s;
    let sum = plus_di + minus_di;
    if sum <= 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / sum
    }
}
