use regex::Regex;
use serde::{
    de::{self, MapAccess, Visitor},
    Deserialize, Deserializer,
};
use std::fmt;

use crate::model::Transaction;

/// A pattern and the category it assigns. Names are searched anywhere, memos
/// only match from their first character.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    search: Regex,
    category: String,
}

impl CategoryRule {
    pub fn new(pattern: &str, category: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            search: Regex::new(pattern)?,
            category: category.to_owned(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.search.as_str()
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn matches(&self, name: &str, memo: Option<&str>) -> bool {
        self.search.is_match(name)
            || memo
                .filter(|m| !m.is_empty())
                .map_or(false, |m| self.matches_start(m))
    }

    // The leftmost match starts at 0 whenever any match does.
    fn matches_start(&self, text: &str) -> bool {
        self.search.find(text).map_or(false, |m| m.start() == 0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CategoryRules {
    rules: Vec<CategoryRule>,
}

impl CategoryRules {
    /// Rules from `(pattern, category)` pairs in priority order.
    pub fn from_pairs<'p>(
        pairs: impl IntoIterator<Item = (&'p str, &'p str)>,
    ) -> Result<Self, regex::Error> {
        let mut rules = Self::default();
        for (pattern, category) in pairs {
            rules.push(CategoryRule::new(pattern, category)?);
        }
        Ok(rules)
    }

    // A repeated pattern keeps its original position and takes the newer category.
    fn push(&mut self, rule: CategoryRule) {
        match self
            .rules
            .iter_mut()
            .find(|r| r.pattern() == rule.pattern())
        {
            Some(existing) => existing.category = rule.category,
            None => self.rules.push(rule),
        }
    }

    pub fn find(&self, name: &str, memo: Option<&str>) -> Option<&CategoryRule> {
        self.rules.iter().find(|r| r.matches(name, memo))
    }

    pub fn categorize(&self, tx: &Transaction) -> Option<&str> {
        self.find(&tx.name, tx.memo.as_deref())
            .map(|r| r.category())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

struct CategoryRulesVisitor;

impl<'de> Visitor<'de> for CategoryRulesVisitor {
    type Value = CategoryRules;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object of pattern to category")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(CategoryRules::default())
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut rules = CategoryRules::default();
        while let Some((pattern, category)) = map.next_entry::<String, String>()? {
            let rule = CategoryRule::new(&pattern, &category).map_err(|e| {
                de::Error::custom(format!("invalid pattern {:?}: {}", pattern, e))
            })?;
            rules.push(rule);
        }
        Ok(rules)
    }
}

// Entries are visited in document order, which is the match priority.
impl<'de> Deserialize<'de> for CategoryRules {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(CategoryRulesVisitor)
    }
}
