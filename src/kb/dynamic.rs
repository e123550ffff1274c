//! Built-in (dynamic) predicates.
//!
//! Dynamic predicates are never looked up in evidence: their truth value is
//! computed from the substituted constants. A predicate may be declared dynamic
//! without an evaluator; grounding a clause that uses it fails explicitly.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::logic::AtomSignature;

/// Evaluator over the constants of a fully substituted dynamic atom.
pub type DynamicFn = Arc<dyn Fn(&[&str]) -> bool + Send + Sync>;

/// Signature -> evaluator. `None` marks a declared but unwired predicate.
#[derive(Clone)]
pub struct DynamicRegistry {
    evaluators: HashMap<AtomSignature, Option<DynamicFn>>,
}

impl DynamicRegistry {
    /// Registry without any predicate.
    pub fn empty() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    /// Registry with the comparison built-ins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("equals", 2, |args| args[0] == args[1]);
        registry.register("notEquals", 2, |args| args[0] != args[1]);
        registry.register("lessThan", 2, |args| {
            compare(args[0], args[1]) == std::cmp::Ordering::Less
        });
        registry.register("lessThanEq", 2, |args| {
            compare(args[0], args[1]) != std::cmp::Ordering::Greater
        });
        registry.register("greaterThan", 2, |args| {
            compare(args[0], args[1]) == std::cmp::Ordering::Greater
        });
        registry.register("greaterThanEq", 2, |args| {
            compare(args[0], args[1]) != std::cmp::Ordering::Less
        });
        registry.register("succ", 2, |args| {
            match (args[0].parse::<i64>(), args[1].parse::<i64>()) {
                (Ok(a), Ok(b)) => a.checked_add(1) == Some(b),
                _ => false,
            }
        });
        registry
    }

    pub fn register<F>(&mut self, symbol: &str, arity: usize, f: F)
    where
        F: Fn(&[&str]) -> bool + Send + Sync + 'static,
    {
        self.evaluators
            .insert(AtomSignature::new(symbol, arity), Some(Arc::new(f)));
    }

    /// Declare a dynamic predicate whose evaluator is not available.
    pub fn declare(&mut self, signature: AtomSignature) {
        self.evaluators.entry(signature).or_insert(None);
    }

    pub fn contains(&self, signature: &AtomSignature) -> bool {
        self.evaluators.contains_key(signature)
    }

    /// `Some(None)` for a declared but unwired predicate.
    pub fn evaluator(&self, signature: &AtomSignature) -> Option<Option<DynamicFn>> {
        self.evaluators.get(signature).cloned()
    }

    pub fn signatures(&self) -> impl Iterator<Item = &AtomSignature> {
        self.evaluators.keys()
    }
}

impl Default for DynamicRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for DynamicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.evaluators.keys().map(|s| s.to_string()).collect();
        names.sort();
        f.debug_struct("DynamicRegistry")
            .field("predicates", &names)
            .finish()
    }
}

/// Numeric comparison when both sides parse as numbers, lexicographic otherwise.
fn compare(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(registry: &DynamicRegistry, symbol: &str, args: &[&str]) -> bool {
        let f = registry
            .evaluator(&AtomSignature::new(symbol, args.len()))
            .flatten()
            .unwrap();
        f(args)
    }

    #[test]
    fn builtin_comparisons() {
        let r = DynamicRegistry::with_builtins();
        assert!(eval(&r, "equals", &["Anna", "Anna"]));
        assert!(!eval(&r, "equals", &["Anna", "Bob"]));
        assert!(eval(&r, "lessThan", &["2", "10"]));
        assert!(!eval(&r, "lessThan", &["10", "2"]));
        assert!(eval(&r, "greaterThanEq", &["3", "3"]));
        assert!(eval(&r, "succ", &["3", "4"]));
        assert!(!eval(&r, "succ", &["3", "5"]));
    }

    #[test]
    fn declared_without_evaluator() {
        let mut r = DynamicRegistry::empty();
        let sig = AtomSignature::new("near", 2);
        r.declare(sig.clone());
        assert!(r.contains(&sig));
        assert!(matches!(r.evaluator(&sig), Some(None)));
        assert!(r.evaluator(&AtomSignature::new("far", 2)).is_none());
    }
}
