//! Tranche, n-th-to-default and base correlation pricing against cached
//! baskets.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use ql_core::{Error, Real};
use ql_credit::{
    BaseCorrelationBasket, BaseCorrelationCurve, BasketPricer, CopulaType, CorrelationModel,
    LossDistributionProvider, LossModelConfig, Name, NameCollection, PaymentSchedule,
    SharedBasket, StrategyKind, StrikeMethod, TrancheKind, TranchePricer,
};
use ql_math::Extrapolation;
use ql_termstructures::{
    DefaultProbabilityTermStructure, FixedRecovery, FlatForward, FlatHazardRate,
    PiecewiseHazardRateCurve, QuoteBump, YieldTermStructure,
};
use std::sync::{Arc, RwLock};

fn pool(size: usize, hazard: Real) -> (NameCollection, Vec<Arc<PiecewiseHazardRateCurve>>) {
    let curves: Vec<Arc<PiecewiseHazardRateCurve>> = (0..size)
        .map(|_| Arc::new(PiecewiseHazardRateCurve::flat(hazard).unwrap()))
        .collect();
    let names = curves
        .iter()
        .enumerate()
        .map(|(i, c)| Name::new(format!("ISS{i}"), c.clone(), Arc::new(FixedRecovery::new(0.4)), 1.0))
        .collect();
    (names, curves)
}

fn config() -> LossModelConfig {
    LossModelConfig {
        track_amortization: true,
        track_default_counts: true,
        ..LossModelConfig::with_strategy(StrategyKind::Heterogeneous)
    }
}

fn shared(names: NameCollection, rho: Real, dates: &[Real]) -> SharedBasket {
    let mut basket =
        BasketPricer::new(names, CorrelationModel::Flat(rho), CopulaType::Gaussian, &config())
            .unwrap();
    basket.compute(dates).unwrap();
    Arc::new(RwLock::new(basket))
}

fn tranche(
    basket: Arc<dyn LossDistributionProvider>,
    discount: Arc<dyn YieldTermStructure>,
    schedule: &PaymentSchedule,
    attachment: Real,
    detachment: Real,
) -> TranchePricer {
    TranchePricer::new(
        basket,
        discount,
        schedule.clone(),
        TrancheKind::Tranche {
            attachment,
            detachment,
        },
        10_000_000.0 * (detachment - attachment),
    )
    .unwrap()
}

// ───────────────────────── tranches ─────────────────────────

#[test]
fn layered_protection_adds_up_to_the_index() {
    let schedule = PaymentSchedule::regular(5.0, 4).unwrap();
    let (names, _) = pool(20, 0.02);
    let basket = shared(names, 0.3, &schedule.boundaries());
    let discount: Arc<dyn YieldTermStructure> = Arc::new(FlatForward::continuous(0.03));

    let bounds = [0.0, 0.03, 0.07, 0.1, 0.15, 0.3, 1.0];
    let mut sum = 0.0;
    for w in bounds.windows(2) {
        sum += tranche(basket.clone(), discount.clone(), &schedule, w[0], w[1])
            .protection_leg()
            .unwrap();
    }
    let index = tranche(basket, discount, &schedule, 0.0, 1.0).protection_leg().unwrap();
    assert_abs_diff_eq!(sum, index, epsilon = 1e-6);
}

#[test]
fn undiscounted_index_protection_is_the_expected_loss() {
    let schedule = PaymentSchedule::regular(3.0, 2).unwrap();
    let (names, _) = pool(8, 0.03);
    let el = names.expected_loss(3.0).unwrap();
    let basket = shared(names, 0.2, &schedule.boundaries());
    let p = tranche(basket, Arc::new(FlatForward::continuous(0.0)), &schedule, 0.0, 1.0);
    assert_relative_eq!(p.protection_leg().unwrap(), 10_000_000.0 * el, max_relative = 1e-8);
}

#[test]
fn fair_spread_prices_the_tranche_at_par() {
    let schedule = PaymentSchedule::regular(5.0, 4).unwrap();
    let (names, _) = pool(20, 0.02);
    let basket = shared(names, 0.3, &schedule.boundaries());
    let p = tranche(basket, Arc::new(FlatForward::continuous(0.03)), &schedule, 0.03, 0.07);
    let results = p.price().unwrap();
    assert!(results.fair_spread > 0.0);
    let at_par = p.clone().with_running_spread(results.fair_spread);
    assert_abs_diff_eq!(at_par.npv().unwrap(), 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(results.fair_spread_bps(), results.fair_spread * 1e4, epsilon = 1e-9);
}

#[test]
fn equity_is_wider_than_senior() {
    let schedule = PaymentSchedule::regular(5.0, 4).unwrap();
    let (names, _) = pool(20, 0.02);
    let basket = shared(names, 0.3, &schedule.boundaries());
    let discount: Arc<dyn YieldTermStructure> = Arc::new(FlatForward::continuous(0.03));
    let equity = tranche(basket.clone(), discount.clone(), &schedule, 0.0, 0.03)
        .fair_spread()
        .unwrap();
    let senior = tranche(basket, discount, &schedule, 0.15, 0.3).fair_spread().unwrap();
    assert!(equity > senior);
}

#[test]
fn amortization_reduces_the_super_senior_annuity() {
    let schedule = PaymentSchedule::regular(5.0, 4).unwrap();
    let (names, _) = pool(10, 0.05);
    let basket = shared(names, 0.3, &schedule.boundaries());
    let discount: Arc<dyn YieldTermStructure> = Arc::new(FlatForward::continuous(0.0));
    let plain = tranche(basket.clone(), discount.clone(), &schedule, 0.6, 1.0);
    let amortizing = plain.clone().with_amortization(true);
    assert!(amortizing.risky_annuity().unwrap() < plain.risky_annuity().unwrap());
}

#[test]
fn curve_sensitivity_refreshes_and_restores_the_basket() {
    let schedule = PaymentSchedule::regular(5.0, 4).unwrap();
    let (names, curves) = pool(10, 0.02);
    let basket = shared(names, 0.3, &schedule.boundaries());
    let p = tranche(basket.clone(), Arc::new(FlatForward::continuous(0.03)), &schedule, 0.0, 0.1)
        .with_running_spread(0.05);
    let base = p.npv().unwrap();

    let quotes = curves[4].quotes();
    let delta = p
        .curve_sensitivity(curves[4].as_ref(), &QuoteBump::absolute(0.0001))
        .unwrap();
    assert!(delta > 0.0, "protection buyer gains when a name gets riskier");
    assert_eq!(curves[4].quotes(), quotes);
    assert_abs_diff_eq!(p.npv().unwrap(), base, epsilon = 1e-9);
}

#[test]
fn flat_curves_cannot_be_bumped() {
    let schedule = PaymentSchedule::regular(1.0, 4).unwrap();
    let names: NameCollection = (0..3)
        .map(|i| {
            Name::new(
                format!("FL{i}"),
                Arc::new(FlatHazardRate::new(0.01)),
                Arc::new(FixedRecovery::new(0.4)),
                1.0,
            )
        })
        .collect();
    let basket = shared(names, 0.3, &schedule.boundaries());
    let p = tranche(basket, Arc::new(FlatForward::continuous(0.0)), &schedule, 0.0, 0.1);
    let curve = FlatHazardRate::new(0.01);
    assert!(p.curve_sensitivity(&curve, &QuoteBump::absolute(0.001)).is_err());
}

#[test]
fn pricing_an_uncomputed_basket_fails() {
    let schedule = PaymentSchedule::regular(1.0, 4).unwrap();
    let (names, _) = pool(3, 0.01);
    let basket: SharedBasket = Arc::new(RwLock::new(
        BasketPricer::new(names, CorrelationModel::Flat(0.3), CopulaType::Gaussian, &config()).unwrap(),
    ));
    let p = tranche(basket, Arc::new(FlatForward::continuous(0.0)), &schedule, 0.0, 0.1);
    assert!(matches!(p.npv(), Err(Error::Uninitialized(_))));
}

// ───────────────────────── n-th to default ─────────────────────────

#[test]
fn first_to_default_on_independent_names() {
    let schedule = PaymentSchedule::regular(1.0, 4).unwrap();
    let (names, _) = pool(5, 0.05);
    let p1 = names.get(0).unwrap().default_probability(1.0);
    let basket = shared(names, 0.0, &schedule.boundaries());
    let ftd = TranchePricer::new(
        basket,
        Arc::new(FlatForward::continuous(0.0)),
        schedule,
        TrancheKind::NthToDefault { n: 1, recovery: 0.4 },
        1_000_000.0,
    )
    .unwrap();
    let p_any = 1.0 - (1.0 - p1).powi(5);
    assert_abs_diff_eq!(ftd.protection_leg().unwrap(), 1_000_000.0 * 0.6 * p_any, epsilon = 1e-4);
}

#[test]
fn later_defaults_are_cheaper_to_protect() {
    let schedule = PaymentSchedule::regular(5.0, 4).unwrap();
    let (names, _) = pool(5, 0.02);
    let basket = shared(names, 0.3, &schedule.boundaries());
    let discount: Arc<dyn YieldTermStructure> = Arc::new(FlatForward::continuous(0.02));
    let spreads: Vec<Real> = (1..=5)
        .map(|n| {
            TranchePricer::new(
                basket.clone(),
                discount.clone(),
                schedule.clone(),
                TrancheKind::NthToDefault { n, recovery: 0.4 },
                1.0,
            )
            .unwrap()
            .fair_spread()
            .unwrap()
        })
        .collect();
    assert!(spreads.windows(2).all(|w| w[0] > w[1]), "{spreads:?}");
}

#[test]
fn first_to_default_cheapens_with_correlation() {
    let schedule = PaymentSchedule::regular(5.0, 4).unwrap();
    let discount: Arc<dyn YieldTermStructure> = Arc::new(FlatForward::continuous(0.02));
    let spread = |rho: Real| {
        let (names, _) = pool(5, 0.02);
        TranchePricer::new(
            shared(names, rho, &schedule.boundaries()),
            discount.clone(),
            schedule.clone(),
            TrancheKind::NthToDefault { n: 1, recovery: 0.4 },
            1.0,
        )
        .unwrap()
        .fair_spread()
        .unwrap()
    };
    assert!(spread(0.0) > spread(0.5));
}

// ───────────────────────── base correlation ─────────────────────────

fn base_correlation_basket(
    names: NameCollection,
    strikes: &[Real],
    correlations: &[Real],
) -> BaseCorrelationBasket {
    let curve =
        BaseCorrelationCurve::new(strikes, correlations, Extrapolation::Flat, StrikeMethod::Unscaled)
            .unwrap();
    BaseCorrelationBasket::new(names, curve, CopulaType::Gaussian, &config()).unwrap()
}

#[test]
fn flat_skew_reproduces_the_flat_basket() {
    let schedule = PaymentSchedule::regular(5.0, 4).unwrap();
    let dates = schedule.boundaries();
    let (names, _) = pool(10, 0.02);
    let mut bc = base_correlation_basket(names.clone(), &[0.03, 0.07, 0.1], &[0.3, 0.3, 0.3]);
    bc.compute(&dates, &[0.03, 0.07]).unwrap();
    assert_eq!(bc.inner_baskets(), 1);

    let discount: Arc<dyn YieldTermStructure> = Arc::new(FlatForward::continuous(0.03));
    let skewed = tranche(Arc::new(RwLock::new(bc)), discount.clone(), &schedule, 0.03, 0.07);
    let flat = tranche(shared(names, 0.3, &dates), discount, &schedule, 0.03, 0.07);
    assert_abs_diff_eq!(
        skewed.protection_leg().unwrap(),
        flat.protection_leg().unwrap(),
        epsilon = 1e-6
    );
}

#[test]
fn steeper_skew_cheapens_the_mezzanine() {
    let schedule = PaymentSchedule::regular(5.0, 4).unwrap();
    let dates = schedule.boundaries();
    let (names, _) = pool(10, 0.02);
    let mut flat = base_correlation_basket(names.clone(), &[0.03, 0.07], &[0.3, 0.3]);
    let mut steep = base_correlation_basket(names, &[0.03, 0.07], &[0.3, 0.5]);
    flat.compute(&dates, &[0.03, 0.07]).unwrap();
    steep.compute(&dates, &[0.03, 0.07]).unwrap();
    // higher detachment correlation lowers the [0, 7 %] base loss
    assert!(
        steep.tranche_expected_loss(0.03, 0.07, 5.0).unwrap()
            < flat.tranche_expected_loss(0.03, 0.07, 5.0).unwrap()
    );
    assert_abs_diff_eq!(steep.base_correlation(0.07).unwrap(), 0.5, epsilon = 1e-12);
    assert!(matches!(steep.base_correlation(0.05), Err(Error::InvalidArgument(_))));
}

#[test]
fn base_correlation_has_no_default_counts() {
    let schedule = PaymentSchedule::regular(1.0, 4).unwrap();
    let (names, _) = pool(5, 0.02);
    let mut bc = base_correlation_basket(names, &[0.03, 0.07], &[0.2, 0.3]);
    bc.compute(&schedule.boundaries(), &[0.03]).unwrap();
    let ntd = TranchePricer::new(
        Arc::new(bc),
        Arc::new(FlatForward::continuous(0.0)),
        schedule,
        TrancheKind::NthToDefault { n: 1, recovery: 0.4 },
        1.0,
    )
    .unwrap();
    assert!(matches!(ntd.protection_leg(), Err(Error::Configuration(_))));
}

#[test]
fn shared_base_correlation_basket_follows_curve_bumps() {
    let schedule = PaymentSchedule::regular(3.0, 4).unwrap();
    let (names, curves) = pool(10, 0.02);
    let mut bc = base_correlation_basket(names, &[0.03, 0.07], &[0.25, 0.35]);
    bc.compute(&schedule.boundaries(), &[0.03, 0.07]).unwrap();
    let p = tranche(
        Arc::new(RwLock::new(bc)),
        Arc::new(FlatForward::continuous(0.01)),
        &schedule,
        0.0,
        0.03,
    )
    .with_running_spread(0.05);
    let delta = p
        .curve_sensitivity(curves[0].as_ref(), &QuoteBump::absolute(0.001))
        .unwrap();
    assert!(delta > 0.0);
}
