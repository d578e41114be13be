//! Cache behaviour of `BasketPricer`: staleness after curve changes,
//! selective refits and sharing between pricers.

use ql_core::Error;
use ql_credit::{
    BasketPricer, BasketStatus, CopulaType, CorrelationModel, LossDistributionProvider,
    LossModelConfig, Name, NameCollection, SharedBasket, StrategyKind,
};
use ql_termstructures::{
    DefaultProbabilityTermStructure, FixedRecovery, PiecewiseHazardRateCurve, QuoteBump,
};
use std::sync::{Arc, RwLock};

/// Twelve names on their own piecewise curves, so any of them can be bumped.
fn names() -> (NameCollection, Vec<Arc<PiecewiseHazardRateCurve>>) {
    let curves: Vec<Arc<PiecewiseHazardRateCurve>> = (0..12)
        .map(|i| {
            let s1 = 0.99 - 0.002 * i as f64;
            Arc::new(
                PiecewiseHazardRateCurve::from_survival_probabilities(&[
                    (1.0, s1),
                    (3.0, s1 * 0.96),
                    (5.0, s1 * 0.92),
                ])
                .unwrap(),
            )
        })
        .collect();
    let names = curves
        .iter()
        .enumerate()
        .map(|(i, c)| {
            Name::new(
                format!("CO{i:02}"),
                c.clone(),
                Arc::new(FixedRecovery::new(0.4)),
                1.0,
            )
        })
        .collect();
    (names, curves)
}

fn basket(strategy: StrategyKind) -> (BasketPricer, Vec<Arc<PiecewiseHazardRateCurve>>) {
    let (names, curves) = names();
    let config = LossModelConfig {
        paths: 4_096,
        track_amortization: true,
        track_default_counts: true,
        ..LossModelConfig::with_strategy(strategy)
    };
    let b = BasketPricer::new(names, CorrelationModel::Flat(0.35), CopulaType::Gaussian, &config)
        .unwrap();
    (b, curves)
}

const DATES: [f64; 4] = [1.0, 2.0, 3.0, 5.0];

#[test]
fn refit_is_identical_to_a_fresh_compute() {
    for strategy in [
        StrategyKind::Homogeneous,
        StrategyKind::Heterogeneous,
        StrategyKind::MonteCarlo,
    ] {
        let (mut b, curves) = basket(strategy);
        b.compute(&DATES).unwrap();

        curves[7].bump_quote(&QuoteBump::absolute(0.0025)).unwrap();
        assert_eq!(b.status(), BasketStatus::Stale { first_changed: 7 });
        let refitted = b.refit(7).unwrap().clone();

        b.reset();
        b.ensure_current().unwrap();
        assert_eq!(b.distribution().unwrap(), &refitted, "{strategy:?}");
    }
}

#[test]
fn refit_from_an_earlier_index_than_needed_is_harmless() {
    let (mut b, curves) = basket(StrategyKind::Heterogeneous);
    b.compute(&DATES).unwrap();
    curves[10].bump_quote(&QuoteBump::absolute(0.001)).unwrap();
    let late = b.refit(10).unwrap().clone();
    let early = b.refit(0).unwrap().clone();
    assert_eq!(late, early);
}

#[test]
fn refit_starts_at_a_changed_curve_below_the_given_index() {
    for strategy in [StrategyKind::Heterogeneous, StrategyKind::MonteCarlo] {
        let (mut b, curves) = basket(strategy);
        b.compute(&DATES).unwrap();

        curves[1].bump_quote(&QuoteBump::absolute(0.05)).unwrap();
        let refitted = b.refit(8).unwrap().clone();
        assert_eq!(b.status(), BasketStatus::Current);

        let config = b.config().clone();
        let mut fresh = BasketPricer::new(
            b.names().clone(),
            CorrelationModel::Flat(0.35),
            CopulaType::Gaussian,
            &config,
        )
        .unwrap();
        assert_eq!(fresh.compute(&DATES).unwrap(), &refitted, "{strategy:?}");
    }
}

#[test]
fn queries_fail_until_the_basket_is_current() {
    let (mut b, curves) = basket(StrategyKind::Heterogeneous);
    assert!(matches!(b.expected_loss(1.0), Err(Error::Uninitialized(_))));

    b.compute(&DATES).unwrap();
    let before = b.tranche_expected_loss(0.0, 0.03, 5.0).unwrap();

    curves[0].bump_quote(&QuoteBump::absolute(0.01)).unwrap();
    assert!(matches!(
        b.tranche_expected_loss(0.0, 0.03, 5.0),
        Err(Error::Stale(_))
    ));
    b.ensure_current().unwrap();
    assert!(b.tranche_expected_loss(0.0, 0.03, 5.0).unwrap() > before);

    // restoring the quote brings the original numbers back
    let restored: Vec<f64> = curves[0].quotes().iter().map(|q| q - 0.01).collect();
    curves[0].set_quotes(&restored, true).unwrap();
    b.ensure_current().unwrap();
    approx::assert_abs_diff_eq!(
        b.tranche_expected_loss(0.0, 0.03, 5.0).unwrap(),
        before,
        epsilon = 1e-12
    );
}

#[test]
fn unknown_dates_are_rejected() {
    let (mut b, _) = basket(StrategyKind::Homogeneous);
    b.compute(&DATES).unwrap();
    assert!(b.expected_loss(4.0).is_err());
    assert!(b.expected_loss(3.0 + 1e-12).is_ok());
}

#[test]
fn dates_must_be_increasing() {
    let (mut b, _) = basket(StrategyKind::Heterogeneous);
    assert!(b.compute(&[2.0, 1.0]).is_err());
    assert_eq!(b.status(), BasketStatus::Uninitialized);
}

#[test]
fn shared_basket_refreshes_itself_for_readers() {
    let (b, curves) = basket(StrategyKind::Heterogeneous);
    let shared: SharedBasket = Arc::new(RwLock::new(b));
    shared.write().unwrap().compute(&DATES).unwrap();

    let provider: Arc<dyn LossDistributionProvider> = shared.clone();
    let before = provider.tranche_expected_loss(0.03, 0.07, 5.0).unwrap();

    curves[3].bump_quote(&QuoteBump::relative(0.5)).unwrap();
    assert!(provider.tranche_expected_loss(0.03, 0.07, 5.0).is_err());
    provider.ensure_fresh().unwrap();
    let after = provider.tranche_expected_loss(0.03, 0.07, 5.0).unwrap();
    assert!(after > before);
    assert_eq!(provider.dates(), DATES.to_vec());
}

#[test]
fn default_counts_include_realized_defaults() {
    let (names, _) = names();
    let mut pool: Vec<Name> = names.iter().cloned().collect();
    pool[0] = pool[0].clone().with_default_index(0);
    pool[1] = pool[1].clone().with_default_index(1);
    let config = LossModelConfig {
        track_default_counts: true,
        ..LossModelConfig::with_strategy(StrategyKind::Heterogeneous)
    };
    let mut b = BasketPricer::new(
        NameCollection::new(pool),
        CorrelationModel::Flat(0.35),
        CopulaType::Gaussian,
        &config,
    )
    .unwrap();
    b.compute(&[1.0]).unwrap();
    approx::assert_abs_diff_eq!(
        b.probability_at_least_n_defaults(2, 1.0).unwrap(),
        1.0,
        epsilon = 1e-12
    );
    // two of twelve names lost 60 % each
    let realized = 2.0 / 12.0 * 0.6;
    assert!(b.probability_over_loss(realized - 1e-9, 1.0).unwrap() > 0.999_999);
}
