//! Reference names and the basket's name collection.

use ql_core::{
    errors::Result, Error, Probability, Real, Time, ValidationErrors, Version, VersionSnapshot,
    Versioned,
};
use ql_termstructures::{DefaultProbabilityTermStructure, RecoveryCurve};
use std::collections::HashSet;
use std::sync::Arc;

/// One reference credit of a basket.
///
/// Curves are shared handles; bumping a curve in place is visible to every
/// basket holding the name and is detected through the curve's version.
#[derive(Debug, Clone)]
pub struct Name {
    id: String,
    survival: Arc<dyn DefaultProbabilityTermStructure>,
    recovery: Arc<dyn RecoveryCurve>,
    principal: Real,
    default_index: Option<usize>,
}

impl Name {
    /// A live name with the given curves and principal.
    pub fn new(
        id: impl Into<String>,
        survival: Arc<dyn DefaultProbabilityTermStructure>,
        recovery: Arc<dyn RecoveryCurve>,
        principal: Real,
    ) -> Self {
        Self {
            id: id.into(),
            survival,
            recovery,
            principal,
            default_index: None,
        }
    }

    /// Mark the name as already defaulted, as the `index`-th credit event of
    /// the basket (zero-based).
    pub fn with_default_index(mut self, index: usize) -> Self {
        self.default_index = Some(index);
        self
    }

    /// Identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Survival curve.
    pub fn survival(&self) -> &Arc<dyn DefaultProbabilityTermStructure> {
        &self.survival
    }

    /// Recovery curve.
    pub fn recovery(&self) -> &Arc<dyn RecoveryCurve> {
        &self.recovery
    }

    /// Principal in currency units.
    pub fn principal(&self) -> Real {
        self.principal
    }

    /// Position of this name among realized defaults, if it has defaulted.
    pub fn default_index(&self) -> Option<usize> {
        self.default_index
    }

    /// `true` if the name has already defaulted.
    pub fn is_defaulted(&self) -> bool {
        self.default_index.is_some()
    }

    /// Unconditional default probability by `t`.
    pub fn default_probability(&self, t: Time) -> Probability {
        self.survival.default_probability(t)
    }

    /// Recovery rate at `t`, checked to lie in `[0, 1]`.
    pub fn recovery_rate(&self, t: Time) -> Result<Real> {
        let r = self.recovery.recovery_rate(t);
        if !(0.0..=1.0).contains(&r) {
            return Err(Error::Configuration(format!(
                "recovery rate {r} of name '{}' at t = {t} is outside [0, 1]",
                self.id
            )));
        }
        Ok(r)
    }
}

/// The names of a basket, in recursion order.
#[derive(Debug, Clone, Default)]
pub struct NameCollection {
    names: Vec<Name>,
}

impl NameCollection {
    /// Collect names; their order is the order of the loss recursion.
    pub fn new(names: Vec<Name>) -> Self {
        Self { names }
    }

    /// Number of names, defaulted ones included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// `true` if the basket has no names.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate over the names.
    pub fn iter(&self) -> std::slice::Iter<'_, Name> {
        self.names.iter()
    }

    /// Name at position `i`.
    pub fn get(&self, i: usize) -> Result<&Name> {
        self.names.get(i).ok_or(Error::IndexOutOfRange {
            index: i,
            size: self.names.len(),
        })
    }

    /// Replace the name at position `i`.
    pub fn replace(&mut self, i: usize, name: Name) -> Result<()> {
        let size = self.names.len();
        let slot = self
            .names
            .get_mut(i)
            .ok_or(Error::IndexOutOfRange { index: i, size })?;
        *slot = name;
        Ok(())
    }

    /// Sum of principals, defaulted names included.
    pub fn total_notional(&self) -> Real {
        self.names.iter().map(Name::principal).sum()
    }

    /// Principal of each name as a fraction of total notional.
    pub fn weights(&self) -> Vec<Real> {
        let total = self.total_notional();
        self.names.iter().map(|n| n.principal / total).collect()
    }

    /// Indices of names that have not defaulted, in recursion order.
    pub fn live_indices(&self) -> Vec<usize> {
        self.names
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_defaulted())
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of realized defaults.
    pub fn realized_defaults(&self) -> usize {
        self.names.iter().filter(|n| n.is_defaulted()).count()
    }

    /// Realized loss and recovered notional of the defaulted names, as
    /// fractions of total notional.
    pub fn realized_loss_and_recovery(&self) -> Result<(Real, Real)> {
        let total = self.total_notional();
        let mut loss = 0.0;
        let mut recovered = 0.0;
        for name in self.names.iter().filter(|n| n.is_defaulted()) {
            let r = name.recovery_rate(0.0)?;
            loss += name.principal / total * (1.0 - r);
            recovered += name.principal / total * r;
        }
        Ok((loss, recovered))
    }

    /// Fraction of total notional still outstanding (live names).
    pub fn remaining_fraction(&self) -> Real {
        let total = self.total_notional();
        if total == 0.0 {
            return 0.0;
        }
        self.names
            .iter()
            .filter(|n| !n.is_defaulted())
            .map(|n| n.principal)
            .sum::<Real>()
            / total
    }

    /// Expected loss of the pool at `t` as a fraction of total notional,
    /// realized losses included.  Independent of the dependence model.
    pub fn expected_loss(&self, t: Time) -> Result<Real> {
        let (realized, _) = self.realized_loss_and_recovery()?;
        let total = self.total_notional();
        let mut el = realized;
        for name in self.names.iter().filter(|n| !n.is_defaulted()) {
            el += name.principal / total * (1.0 - name.recovery_rate(t)?) * name.default_probability(t);
        }
        Ok(el)
    }

    /// Record every problem with the names in `errors`.
    pub fn validate(&self, errors: &mut ValidationErrors) {
        let mut ids = HashSet::new();
        let mut default_indices = HashSet::new();
        for (i, name) in self.names.iter().enumerate() {
            errors.check(ids.insert(name.id.as_str()), || {
                format!("duplicate name id '{}' at position {i}", name.id)
            });
            errors.check(name.principal.is_finite() && name.principal >= 0.0, || {
                format!(
                    "principal of '{}' must be finite and non-negative, got {}",
                    name.id, name.principal
                )
            });
            if let Some(k) = name.default_index {
                errors.check(default_indices.insert(k), || {
                    format!("default index {k} of '{}' is used twice", name.id)
                });
            }
            let r = name.recovery.recovery_rate(0.0);
            errors.check((0.0..=1.0).contains(&r), || {
                format!("recovery rate of '{}' must be in [0, 1], got {r}", name.id)
            });
        }
        errors.check(self.names.is_empty() || self.total_notional() > 0.0, || {
            "total basket notional must be positive".to_string()
        });
    }

    /// Versions of every curve, two entries per name (survival, recovery).
    pub fn versions(&self) -> VersionSnapshot {
        VersionSnapshot::from_versions(self.names.iter().flat_map(|n| -> [Version; 2] {
            [n.survival.version(), n.recovery.version()]
        }))
    }

    /// Index of the first name whose curves changed between two snapshots
    /// taken with [`versions`](NameCollection::versions).
    pub fn first_changed(before: &VersionSnapshot, after: &VersionSnapshot) -> Option<usize> {
        before.first_changed(after).map(|i| i / 2)
    }
}

impl<'a> IntoIterator for &'a NameCollection {
    type Item = &'a Name;
    type IntoIter = std::slice::Iter<'a, Name>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.iter()
    }
}

impl FromIterator<Name> for NameCollection {
    fn from_iter<I: IntoIterator<Item = Name>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
