//! Performance analyzer (C8): derivatives, model fitting, scaling-region
//! classification, elasticity, bottleneck inference, and predictions over
//! a sorted `BandResult[]`.

use serde::{Deserialize, Serialize};

use crate::types::BandResult;

/// First/second derivative vectors over (connections, TPS), one entry per
/// band, aligned by index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Derivatives {
    pub first: Vec<f64>,
    pub second: Vec<f64>,
}

/// Closed set of curve types the analyzer can fit. Polynomial is included
/// because it's implemented correctly here; a logistic fit is
/// deliberately not offered — the source's `fitLogistic` is a stub with no
/// real semantics to carry forward, so it's excluded from
/// `find_best_fit_model` rather than faked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ModelType {
    Linear,
    Logarithmic,
    Exponential,
    Polynomial(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitModel {
    pub model_type: ModelType,
    pub coefficients: Vec<f64>,
    pub r_squared: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RegionClass {
    Baseline,
    LinearScaling,
    DiminishingReturns,
    Saturation,
    Degradation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingRegion {
    pub from_band: u32,
    pub to_band: u32,
    pub marginal_gain: f64,
    pub classification: RegionClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Bottleneck {
    DatabaseBound,
    IoBound,
    ConnectionBound,
    QueueBound,
    MemoryBound,
    CpuBound,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedConfiguration {
    pub band_id: u32,
    pub workers: usize,
    pub connections: usize,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformancePrediction {
    pub connections: usize,
    pub predicted_tps: f64,
    pub predicted_latency_ms: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub confidence_level: f64,
}

/// The analyzer's full output for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub derivatives: Derivatives,
    pub best_fit: Option<FitModel>,
    pub regions: Vec<ScalingRegion>,
    pub bottleneck: Bottleneck,
    pub recommendation: Option<RecommendedConfiguration>,
    pub predictions: Vec<PerformancePrediction>,
}

impl Analysis {
    /// The empty analysis returned for a zero-band series.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            derivatives: Derivatives::default(),
            best_fit: None,
            regions: Vec::new(),
            bottleneck: Bottleneck::None,
            recommendation: None,
            predictions: Vec::new(),
        }
    }
}

/// Fractional-change ratio between two consecutive bands, with the
/// spec-fixed interpretation buckets.
#[derive(Debug, Clone, Copy)]
pub struct Elasticity {
    pub epsilon: f64,
    pub interpretation: &'static str,
}

#[must_use]
pub fn elasticity(
    baseline_tps: f64,
    baseline_conn: f64,
    delta_tps: f64,
    delta_conn: f64,
) -> Elasticity {
    let epsilon = if baseline_tps == 0.0 || baseline_conn == 0.0 || delta_conn == 0.0 {
        0.0
    } else {
        (delta_tps / baseline_tps) / (delta_conn / baseline_conn)
    };
    let interpretation = if epsilon > 1.0 {
        "Excellent scaling — superlinear returns"
    } else if epsilon >= 0.8 {
        "Very good scaling — near-linear returns"
    } else if epsilon >= 0.5 {
        "Good scaling — moderate returns"
    } else if epsilon >= 0.2 {
        "Fair scaling — weak returns"
    } else if epsilon > 0.0 {
        "Poor scaling — marginal returns"
    } else {
        "No scaling benefit or regressing"
    };
    Elasticity { epsilon, interpretation }
}

/// Result of a two-sample Welch's t-test, exposed for pairwise band
/// comparison. Not required for `Analysis` itself.
#[derive(Debug, Clone, Copy)]
pub struct WelchTTest {
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
}

#[must_use]
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<WelchTTest> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
    let var = |xs: &[f64], m: f64| xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;

    let ma = mean(a);
    let mb = mean(b);
    let va = var(a, ma);
    let vb = var(b, mb);
    let na = a.len() as f64;
    let nb = b.len() as f64;

    let se2 = va / na + vb / nb;
    if se2 <= 0.0 {
        return None;
    }
    let t = (ma - mb) / se2.sqrt();
    let df_num = se2 * se2;
    let df_den = (va / na).powi(2) / (na - 1.0) + (vb / nb).powi(2) / (nb - 1.0);
    let df = if df_den > 0.0 { df_num / df_den } else { na + nb - 2.0 };

    Some(WelchTTest {
        t_statistic: t,
        degrees_of_freedom: df,
    })
}

/// Cost/benefit ratio between two bands: extra throughput gained per
/// extra connection spent.
#[must_use]
pub fn cost_benefit(from: &BandResult, to: &BandResult) -> f64 {
    let dconn = to.connections as f64 - from.connections as f64;
    if dconn == 0.0 {
        0.0
    } else {
        (to.performance.tps - from.performance.tps) / dconn
    }
}

/// Little's-law-derived expected number of requests in a queueing system;
/// the source allowed this to go negative, the spec mandates clamping.
#[must_use]
pub fn estimate_total_requests(arrival_rate: f64, avg_latency_seconds: f64) -> f64 {
    (arrival_rate * avg_latency_seconds).max(0.0)
}

fn central_derivative(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0.0];
    }
    let mut out = vec![0.0; n];
    out[0] = (ys[1] - ys[0]) / (xs[1] - xs[0]);
    out[n - 1] = (ys[n - 1] - ys[n - 2]) / (xs[n - 1] - xs[n - 2]);
    for i in 1..n - 1 {
        out[i] = (ys[i + 1] - ys[i - 1]) / (xs[i + 1] - xs[i - 1]);
    }
    out
}

/// Second derivative via a three-point finite-difference stencil; zero at
/// endpoints where a proper one-sided formula would need a fourth point
/// the series doesn't have.
fn second_derivative(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut out = vec![0.0; n];
    if n < 3 {
        return out;
    }
    for i in 1..n - 1 {
        let h1 = xs[i] - xs[i - 1];
        let h2 = xs[i + 1] - xs[i];
        if h1 <= 0.0 || h2 <= 0.0 {
            continue;
        }
        out[i] = 2.0 * (h1 * ys[i + 1] - (h1 + h2) * ys[i] + h2 * ys[i - 1]) / (h1 * h2 * (h1 + h2));
    }
    out
}

fn r_squared(ys: &[f64], predicted: &[f64]) -> f64 {
    let mean = ys.iter().sum::<f64>() / ys.len() as f64;
    let ss_tot: f64 = ys.iter().map(|y| (y - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if predicted == ys { 1.0 } else { 0.0 };
    }
    let ss_res: f64 = ys.iter().zip(predicted).map(|(y, p)| (y - p).powi(2)).sum();
    (1.0 - ss_res / ss_tot).max(0.0)
}

/// Ordinary least squares for `y = a + b*x`, returning `[a, b]`.
fn ols(xs: &[f64], ys: &[f64]) -> [f64; 2] {
    let n = xs.len() as f64;
    let sx: f64 = xs.iter().sum();
    let sy: f64 = ys.iter().sum();
    let sxx: f64 = xs.iter().map(|x| x * x).sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
    let denom = n * sxx - sx * sx;
    if denom.abs() < 1e-12 {
        return [sy / n, 0.0];
    }
    let b = (n * sxy - sx * sy) / denom;
    let a = (sy - b * sx) / n;
    [a, b]
}

fn fit_linear(xs: &[f64], ys: &[f64]) -> FitModel {
    let [a, b] = ols(xs, ys);
    let predicted: Vec<f64> = xs.iter().map(|x| a + b * x).collect();
    FitModel {
        model_type: ModelType::Linear,
        coefficients: vec![a, b],
        r_squared: r_squared(ys, &predicted),
    }
}

fn fit_logarithmic(xs: &[f64], ys: &[f64]) -> Option<FitModel> {
    if xs.iter().any(|&x| x <= 0.0) {
        return None;
    }
    let lx: Vec<f64> = xs.iter().map(|x| x.ln()).collect();
    let [a, b] = ols(&lx, ys);
    let predicted: Vec<f64> = xs.iter().map(|x| a + b * x.ln()).collect();
    Some(FitModel {
        model_type: ModelType::Logarithmic,
        coefficients: vec![a, b],
        r_squared: r_squared(ys, &predicted),
    })
}

fn fit_exponential(xs: &[f64], ys: &[f64]) -> Option<FitModel> {
    if ys.iter().any(|&y| y <= 0.0) {
        return None;
    }
    let ly: Vec<f64> = ys.iter().map(|y| y.ln()).collect();
    let [a, b] = ols(xs, &ly);
    let predicted: Vec<f64> = xs.iter().map(|x| (a + b * x).exp()).collect();
    Some(FitModel {
        model_type: ModelType::Exponential,
        coefficients: vec![a.exp(), b],
        r_squared: r_squared(ys, &predicted),
    })
}

/// Least-squares polynomial fit up to `degree`, via Vandermonde normal
/// equations solved with Gaussian elimination.
fn fit_polynomial(xs: &[f64], ys: &[f64], degree: usize) -> Option<FitModel> {
    let n = xs.len();
    if degree >= n {
        return None;
    }
    let terms = degree + 1;
    // Normal equations: (X^T X) c = X^T y
    let mut ata = vec![vec![0.0; terms]; terms];
    let mut aty = vec![0.0; terms];
    for i in 0..n {
        let mut powers = vec![1.0; terms];
        for k in 1..terms {
            powers[k] = powers[k - 1] * xs[i];
        }
        for r in 0..terms {
            aty[r] += powers[r] * ys[i];
            for c in 0..terms {
                ata[r][c] += powers[r] * powers[c];
            }
        }
    }
    let coeffs = solve_linear_system(&mut ata, &mut aty)?;
    let predicted: Vec<f64> = xs
        .iter()
        .map(|&x| coeffs.iter().enumerate().map(|(k, c)| c * x.powi(k as i32)).sum())
        .collect();
    Some(FitModel {
        model_type: ModelType::Polynomial(degree as u32),
        coefficients: coeffs,
        r_squared: r_squared(ys, &predicted),
    })
}

/// Gaussian elimination with partial pivoting. Returns `None` if the
/// system is singular.
fn solve_linear_system(a: &mut [Vec<f64>], b: &mut [f64]) -> Option<Vec<f64>> {
    let n = b.len();
    for i in 0..n {
        let mut pivot = i;
        for r in i + 1..n {
            if a[r][i].abs() > a[pivot][i].abs() {
                pivot = r;
            }
        }
        if a[pivot][i].abs() < 1e-12 {
            return None;
        }
        a.swap(i, pivot);
        b.swap(i, pivot);

        for r in i + 1..n {
            let factor = a[r][i] / a[i][i];
            for c in i..n {
                a[r][c] -= factor * a[i][c];
            }
            b[r] -= factor * b[i];
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for c in i + 1..n {
            sum -= a[i][c] * x[c];
        }
        x[i] = sum / a[i][i];
    }
    Some(x)
}

/// Fit every candidate model and pick the highest R².
#[must_use]
pub fn find_best_fit_model(xs: &[f64], ys: &[f64]) -> Option<FitModel> {
    if xs.len() < 2 {
        return None;
    }
    let mut candidates = vec![fit_linear(xs, ys)];
    if let Some(m) = fit_logarithmic(xs, ys) {
        candidates.push(m);
    }
    if let Some(m) = fit_exponential(xs, ys) {
        candidates.push(m);
    }
    let poly_degree = 3.min(xs.len().saturating_sub(1));
    if poly_degree >= 2 {
        if let Some(m) = fit_polynomial(xs, ys, poly_degree) {
            candidates.push(m);
        }
    }
    candidates
        .into_iter()
        .max_by(|a, b| a.r_squared.partial_cmp(&b.r_squared).unwrap())
}

fn classify_region(marginal: f64, prev_marginal: f64) -> RegionClass {
    if marginal < 0.0 {
        RegionClass::Degradation
    } else if prev_marginal > 0.0 && marginal >= 0.9 * prev_marginal {
        RegionClass::LinearScaling
    } else if prev_marginal > 0.0 && marginal >= 0.5 * prev_marginal {
        RegionClass::DiminishingReturns
    } else {
        RegionClass::Saturation
    }
}

fn classify_bottleneck(bands: &[BandResult], scaling_efficiency: f64) -> Bottleneck {
    if bands.is_empty() {
        return Bottleneck::None;
    }
    let avg_error_rate =
        bands.iter().map(|b| b.performance.error_rate).sum::<f64>() / bands.len() as f64;
    if avg_error_rate > 0.05 {
        return Bottleneck::DatabaseBound;
    }

    let first = &bands[0];
    let last = &bands[bands.len() - 1];
    let latency_ratio = if first.performance.avg_latency_ms > 0.0 {
        last.performance.avg_latency_ms / first.performance.avg_latency_ms
    } else {
        1.0
    };

    if latency_ratio > 2.0 && scaling_efficiency < 0.5 {
        return Bottleneck::IoBound;
    }
    if scaling_efficiency < 0.3 {
        return Bottleneck::ConnectionBound;
    }
    if latency_ratio > 1.5 {
        return Bottleneck::QueueBound;
    }
    if bands.iter().any(|b| b.resources.mem_mb > 1024.0) {
        return Bottleneck::MemoryBound;
    }
    if scaling_efficiency < 0.7 {
        return Bottleneck::CpuBound;
    }
    Bottleneck::None
}

/// Run the full analysis over a `connections`-sorted band series.
#[must_use]
pub fn analyze(bands: &[BandResult]) -> Analysis {
    if bands.is_empty() {
        return Analysis::empty();
    }
    if bands.len() == 1 {
        // Single band: no regions are meaningful, but a recommendation and
        // derivative of zero are still well-defined.
        let band = &bands[0];
        return Analysis {
            derivatives: Derivatives {
                first: vec![0.0],
                second: vec![0.0],
            },
            best_fit: None,
            regions: Vec::new(),
            bottleneck: Bottleneck::None,
            recommendation: Some(RecommendedConfiguration {
                band_id: band.band_id,
                workers: band.workers,
                connections: band.connections,
                confidence: 0.0,
            }),
            predictions: Vec::new(),
        };
    }

    let xs: Vec<f64> = bands.iter().map(|b| b.connections as f64).collect();
    let ys: Vec<f64> = bands.iter().map(|b| b.performance.tps).collect();

    let derivatives = Derivatives {
        first: central_derivative(&xs, &ys),
        second: second_derivative(&xs, &ys),
    };

    let best_fit = find_best_fit_model(&xs, &ys);

    let mut regions = Vec::with_capacity(bands.len() - 1);
    let mut prev_marginal = 0.0;
    for i in 1..bands.len() {
        let dconn = xs[i] - xs[i - 1];
        let marginal = if dconn != 0.0 { (ys[i] - ys[i - 1]) / dconn } else { 0.0 };
        let classification = if i == 1 {
            RegionClass::Baseline
        } else {
            classify_region(marginal, prev_marginal)
        };
        regions.push(ScalingRegion {
            from_band: bands[i - 1].band_id,
            to_band: bands[i].band_id,
            marginal_gain: marginal,
            classification,
        });
        prev_marginal = marginal;
    }

    let first_per_conn = if bands[0].connections > 0 {
        bands[0].performance.tps / bands[0].connections as f64
    } else {
        0.0
    };
    let last_per_conn = if bands[bands.len() - 1].connections > 0 {
        bands[bands.len() - 1].performance.tps / bands[bands.len() - 1].connections as f64
    } else {
        0.0
    };
    let scaling_efficiency = if first_per_conn > 0.0 { last_per_conn / first_per_conn } else { 0.0 };

    let bottleneck = classify_bottleneck(bands, scaling_efficiency);

    let recommendation = bands
        .iter()
        .max_by(|a, b| {
            let ra = if a.connections > 0 { a.performance.tps / a.connections as f64 } else { 0.0 };
            let rb = if b.connections > 0 { b.performance.tps / b.connections as f64 } else { 0.0 };
            ra.partial_cmp(&rb).unwrap()
        })
        .map(|band| RecommendedConfiguration {
            band_id: band.band_id,
            workers: band.workers,
            connections: band.connections,
            confidence: best_fit.as_ref().map(|m| m.r_squared.clamp(0.0, 1.0)).unwrap_or(0.0),
        });

    Analysis {
        derivatives,
        best_fit,
        regions,
        bottleneck,
        recommendation,
        predictions: Vec::new(),
    }
}

/// Predict TPS/latency at connection counts not present in the data,
/// using the analyzer's best-fit model.
#[must_use]
pub fn predict(bands: &[BandResult], model: &FitModel, at_connections: &[usize]) -> Vec<PerformancePrediction> {
    let xs: Vec<f64> = bands.iter().map(|b| b.connections as f64).collect();
    let ys: Vec<f64> = bands.iter().map(|b| b.performance.tps).collect();
    let lats: Vec<f64> = bands.iter().map(|b| b.performance.avg_latency_ms).collect();

    at_connections
        .iter()
        .filter(|c| !xs.contains(&(**c as f64)))
        .map(|&c| {
            let x = c as f64;
            let predicted_tps = match model.model_type {
                ModelType::Linear => model.coefficients[0] + model.coefficients[1] * x,
                ModelType::Logarithmic => model.coefficients[0] + model.coefficients[1] * x.ln(),
                ModelType::Exponential => model.coefficients[0] * (model.coefficients[1] * x).exp(),
                ModelType::Polynomial(_) => model
                    .coefficients
                    .iter()
                    .enumerate()
                    .map(|(k, coef)| coef * x.powi(k as i32))
                    .sum(),
            };
            let predicted_latency_ms = interpolate(&xs, &lats, x);
            let spread = (predicted_tps * (1.0 - model.r_squared) * 0.5).abs();
            PerformancePrediction {
                connections: c,
                predicted_tps,
                predicted_latency_ms,
                ci_low: predicted_tps - spread,
                ci_high: predicted_tps + spread,
                confidence_level: model.r_squared.clamp(0.0, 1.0),
            }
        })
        .collect()
}

fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    for w in xs.windows(2).zip(ys.windows(2)) {
        let ((x0, x1), (y0, y1)) = ((w.0[0], w.0[1]), (w.1[0], w.1[1]));
        if x >= x0 && x <= x1 {
            let frac = if x1 != x0 { (x - x0) / (x1 - x0) } else { 0.0 };
            return y0 + (y1 - y0) * frac;
        }
    }
    ys[ys.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Efficiency, Performance, Resources, Stability};
    use std::time::Duration;

    fn band(id: u32, workers: usize, connections: usize, tps: f64, p95: f64, error_rate: f64) -> BandResult {
        BandResult {
            band_id: id,
            workers,
            connections,
            measured_duration: Duration::from_secs(30),
            performance: Performance {
                tps,
                qps: tps * 1.2,
                avg_latency_ms: 10.0,
                p50_latency_ms: p95 * 0.5,
                p95_latency_ms: p95,
                p99_latency_ms: p95 * 1.2,
                error_count: 0,
                error_rate,
            },
            efficiency: Efficiency::default(),
            stability: Stability::default(),
            resources: Resources::default(),
            failed: false,
        }
    }

    #[test]
    fn elasticity_scenario_from_spec() {
        // conns 10->20, TPS 100->150 => epsilon = 0.5, "Good scaling".
        let e = elasticity(100.0, 10.0, 50.0, 10.0);
        assert!((e.epsilon - 0.5).abs() < 1e-9);
        assert_eq!(e.interpretation, "Good scaling — moderate returns");
    }

    #[test]
    fn single_band_has_no_regions_and_no_bottleneck() {
        let bands = vec![band(1, 4, 4, 100.0, 10.0, 0.0)];
        let analysis = analyze(&bands);
        assert!(analysis.regions.is_empty());
        assert_eq!(analysis.bottleneck, Bottleneck::None);
        assert!(analysis.recommendation.is_some());
    }

    #[test]
    fn empty_series_returns_empty_analysis() {
        let analysis = analyze(&[]);
        assert!(analysis.regions.is_empty());
        assert!(analysis.best_fit.is_none());
    }

    #[test]
    fn first_region_is_always_baseline() {
        let bands = vec![band(1, 2, 2, 50.0, 10.0, 0.0), band(2, 4, 4, 100.0, 10.0, 0.0)];
        let analysis = analyze(&bands);
        assert_eq!(analysis.regions[0].classification, RegionClass::Baseline);
    }

    #[test]
    fn degradation_detected_on_negative_marginal() {
        let bands = vec![
            band(1, 2, 2, 50.0, 10.0, 0.0),
            band(2, 4, 4, 100.0, 10.0, 0.0),
            band(3, 6, 6, 80.0, 10.0, 0.0),
        ];
        let analysis = analyze(&bands);
        assert_eq!(analysis.regions[1].classification, RegionClass::Degradation);
    }

    #[test]
    fn database_bound_when_error_rate_high() {
        let bands = vec![
            band(1, 2, 2, 50.0, 10.0, 0.1),
            band(2, 4, 4, 60.0, 10.0, 0.12),
        ];
        let analysis = analyze(&bands);
        assert_eq!(analysis.bottleneck, Bottleneck::DatabaseBound);
    }

    #[test]
    fn linear_fit_recovers_known_line() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        let ys = vec![3.0, 5.0, 7.0, 9.0]; // y = 1 + 2x
        let model = fit_linear(&xs, &ys);
        assert!((model.coefficients[0] - 1.0).abs() < 1e-6);
        assert!((model.coefficients[1] - 2.0).abs() < 1e-6);
        assert!(model.r_squared > 0.999);
    }

    #[test]
    fn best_fit_model_picks_highest_r_squared() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = vec![3.0, 5.0, 7.0, 9.0, 11.0];
        let model = find_best_fit_model(&xs, &ys).unwrap();
        assert!(model.r_squared > 0.99);
    }

    #[test]
    fn derivatives_have_length_matching_bands() {
        let bands = vec![
            band(1, 2, 2, 50.0, 10.0, 0.0),
            band(2, 4, 4, 90.0, 10.0, 0.0),
            band(3, 6, 6, 120.0, 10.0, 0.0),
        ];
        let analysis = analyze(&bands);
        assert_eq!(analysis.derivatives.first.len(), 3);
        assert_eq!(analysis.derivatives.second.len(), 3);
    }

    #[test]
    fn queueing_helper_clamps_to_non_negative() {
        assert_eq!(estimate_total_requests(-5.0, 2.0), 0.0);
        assert!(estimate_total_requests(5.0, 2.0) >= 0.0);
    }

    #[test]
    fn welch_t_test_needs_at_least_two_samples_per_group() {
        assert!(welch_t_test(&[1.0], &[1.0, 2.0]).is_none());
        assert!(welch_t_test(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).is_some());
    }

    #[test]
    fn predictions_skip_connections_already_in_data() {
        let bands = vec![
            band(1, 2, 2, 50.0, 10.0, 0.0),
            band(2, 4, 4, 100.0, 10.0, 0.0),
        ];
        let model = fit_linear(&[2.0, 4.0], &[50.0, 100.0]);
        let preds = predict(&bands, &model, &[2, 4, 6]);
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].connections, 6);
    }
}
