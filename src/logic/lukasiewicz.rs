//! Łukasiewicz connectives over soft truth values in [0, 1].

/// `1 − v`.
pub fn negation(value: f64) -> f64 {
    1.0 - value
}

/// `min(1, Σ vᵢ)`.
pub fn disjunction(values: impl IntoIterator<Item = f64>) -> f64 {
    values.into_iter().sum::<f64>().min(1.0)
}

/// `max(0, Σ vᵢ − (n − 1))`.
pub fn conjunction(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        return 1.0;
    }
    (sum - (n as f64 - 1.0)).max(0.0)
}

/// Truth of a literal with the given polarity.
pub fn literal(value: f64, negated: bool) -> f64 {
    if negated { negation(value) } else { value }
}

/// Distance to satisfaction of a disjunction: `1 − min(1, Σ vᵢ)`.
pub fn distance_to_satisfaction(values: impl IntoIterator<Item = f64>) -> f64 {
    1.0 - disjunction(values)
}

/// A disjunction whose summed literal truth reaches 1 is satisfied.
pub fn is_satisfied(sum: f64) -> bool {
    sum >= 1.0
}
