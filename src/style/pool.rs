//! Class pool for style deduplication.
//!
//! Style keys are interned: identical keys share one generated class. Class
//! names are coined in first-use order, which keeps output stable across
//! captures of the same tree.

use std::collections::HashMap;

/// Interns style keys and coins `c1`, `c2`, ... class names.
#[derive(Clone, Default)]
pub struct ClassPool {
    /// Hash-based deduplication map from key to class index.
    intern_map: HashMap<String, usize>,
    /// All unique keys in first-use order.
    keys: Vec<String>,
}

impl ClassPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a style key, returning its class name.
    ///
    /// If an identical key was seen before, returns the existing class.
    pub fn class_for(&mut self, key: &str) -> String {
        if let Some(&index) = self.intern_map.get(key) {
            return class_name(index);
        }

        let index = self.keys.len();
        self.intern_map.insert(key.to_string(), index);
        self.keys.push(key.to_string());
        class_name(index)
    }

    /// Number of unique keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Emit one rule per class, in first-use order.
    pub fn to_css(&self) -> String {
        let mut css = String::new();
        for (index, key) in self.keys.iter().enumerate() {
            if key.is_empty() {
                continue;
            }
            css.push('.');
            css.push_str(&class_name(index));
            css.push('{');
            css.push_str(key);
            css.push('}');
        }
        css
    }
}

fn class_name(index: usize) -> String {
    format!("c{}", index + 1)
}

impl std::fmt::Debug for ClassPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassPool")
            .field("count", &self.keys.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning() {
        let mut pool = ClassPool::new();
        let c1 = pool.class_for("color: red;");
        let c2 = pool.class_for("color: blue;");
        let c3 = pool.class_for("color: red;");

        assert_eq!(c1, "c1");
        assert_eq!(c2, "c2");
        assert_eq!(c3, "c1");
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_first_use_order_in_css() {
        let mut pool = ClassPool::new();
        pool.class_for("color: red;");
        pool.class_for("margin-top: 4px;");
        assert_eq!(pool.to_css(), ".c1{color: red;}.c2{margin-top: 4px;}");
    }

    #[test]
    fn test_empty_key_emits_no_rule() {
        let mut pool = ClassPool::new();
        let class = pool.class_for("");
        assert_eq!(class, "c1");
        assert_eq!(pool.to_css(), "");
    }
}
