//! Condition micro-language.
//!
//! Settings gate themselves (`requires`) and pick contingent defaults with a
//! tiny expression language:
//!
//! ```text
//! expr   := clause ( "||" clause )*
//! clause := "{" type "." id "}=" value
//! value  := "'" literal "'" | "true" | "false"
//! ```
//!
//! e.g. `{hq.foo}='bar'||{$parent.doc_type}='Application'`.
//!
//! Parsing happens once, against a built [`Registry`]: every clause resolves
//! its reference up front, so evaluation is a list walk with no string work.
//!
//! ## Recovery
//!
//! A clause that does not match the grammar, or that names a setting the
//! registry does not know, is logged and dropped. The remaining clauses still
//! count. An expression with no surviving clauses is *vacuously true*: this is
//! what every setting without a `requires` string relies on.

use super::registry::{PARENT_KIND, Registry};
use crate::SettingId;
use serde_json::Value;
use tracing::error;

/// What a clause compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Another setting's `visibleValue`.
    Setting(SettingId),
    /// A read-only value from the `$parent` environment.
    Parent(String),
}

/// `{type.id}=value`, already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub reference: Reference,
    pub expected: Value,
}

/// Where a condition reads current values from.
pub trait ValueSource {
    fn visible_value(&self, id: SettingId) -> Value;
    fn parent_value(&self, name: &str) -> Option<Value>;
}

/// OR over a list of equality clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    /// A condition with no clauses; always holds.
    pub fn always() -> Self {
        Condition::default()
    }

    /// Parse `expr` against `registry`, dropping clauses that cannot be
    /// parsed or resolved.
    pub fn parse(expr: &str, registry: &Registry) -> Self {
        let clause_re = regex!(r"\{([$\w]+)\.([\w\-]+)\}=('([\w\-/]*)'|(true)|(false))");

        if expr.is_empty() {
            return Condition::always();
        }

        let mut clauses = Vec::new();
        for part in expr.split("||") {
            let Some(caps) = clause_re.captures(part) else {
                error!(clause = part, "unable to parse condition clause");
                continue;
            };
            let kind = &caps[1];
            let id = &caps[2];
            let expected = if let Some(literal) = caps.get(4) {
                Value::String(literal.as_str().to_string())
            } else {
                Value::Bool(caps.get(5).is_some())
            };

            let reference = if kind == PARENT_KIND {
                registry.parent().contains(id).then(|| Reference::Parent(id.to_string()))
            } else {
                registry.lookup(kind, id).map(Reference::Setting)
            };
            match reference {
                Some(reference) => clauses.push(Clause { reference, expected }),
                None => error!(kind, id, "condition references an unknown setting"),
            }
        }

        Condition { clauses }
    }

    /// True iff any clause matches its referenced value; true when empty.
    pub fn check(&self, source: &impl ValueSource) -> bool {
        if self.clauses.is_empty() {
            return true;
        }
        self.clauses.iter().any(|clause| {
            let current = match &clause.reference {
                Reference::Setting(id) => source.visible_value(*id),
                Reference::Parent(name) => source.parent_value(name).unwrap_or(Value::Null),
            };
            current == clause.expected
        })
    }

    /// Settings referenced by the clauses, in clause order.
    pub fn settings(&self) -> impl Iterator<Item = SettingId> + '_ {
        self.clauses.iter().filter_map(|c| match c.reference {
            Reference::Setting(id) => Some(id),
            Reference::Parent(_) => None,
        })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SectionDescriptor;
    use crate::engine::registry::ParentEnv;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    struct Fixed {
        values: HashMap<SettingId, Value>,
        parent: BTreeMap<String, Value>,
    }

    impl ValueSource for Fixed {
        fn visible_value(&self, id: SettingId) -> Value {
            self.values.get(&id).cloned().unwrap_or(Value::Null)
        }

        fn parent_value(&self, name: &str) -> Option<Value> {
            self.parent.get(name).cloned()
        }
    }

    fn registry() -> Registry {
        let sections = vec![SectionDescriptor {
            settings: vec![json!({"type": "a", "id": "b"}), json!({"type": "a", "id": "c"})],
            ..SectionDescriptor::default()
        }];
        let parent = BTreeMap::from([("doc_type".to_string(), json!("Application"))]);
        Registry::build(&sections, ParentEnv::new(parent))
    }

    fn source(b: Value, c: Value) -> Fixed {
        Fixed {
            values: HashMap::from([(SettingId(0), b), (SettingId(1), c)]),
            parent: BTreeMap::from([("doc_type".to_string(), json!("Application"))]),
        }
    }

    #[test]
    fn parses_literals_and_booleans() {
        let cond = Condition::parse("{a.b}='x-1/2'||{a.c}=true||{a.c}=false", &registry());
        let expected: Vec<Value> = cond.clauses().iter().map(|c| c.expected.clone()).collect();
        assert_eq!(expected, vec![json!("x-1/2"), json!(true), json!(false)]);
        assert_eq!(cond.settings().collect::<Vec<_>>(), vec![SettingId(0), SettingId(1), SettingId(1)]);
    }

    #[test]
    fn clauses_are_ored() {
        let cond = Condition::parse("{a.b}='x'||{a.c}=true", &registry());
        assert!(cond.check(&source(json!("x"), json!(false))));
        assert!(cond.check(&source(json!("y"), json!(true))));
        assert!(!cond.check(&source(json!("y"), json!(false))));
    }

    #[test]
    fn equality_is_strict() {
        let cond = Condition::parse("{a.c}=true", &registry());
        assert!(!cond.check(&source(Value::Null, json!("true"))));
    }

    #[test]
    fn empty_expression_is_vacuously_true() {
        let cond = Condition::parse("", &registry());
        assert!(cond.is_empty());
        assert!(cond.check(&source(Value::Null, Value::Null)));
    }

    #[test]
    fn bad_clauses_are_dropped_but_others_survive() {
        let cond = Condition::parse("garbage||{nope.b}='x'||{a.missing}='x'||{a.b}='x'", &registry());
        assert_eq!(cond.clauses().len(), 1);
        assert!(!cond.check(&source(json!("y"), Value::Null)));
        assert!(cond.check(&source(json!("x"), Value::Null)));
    }

    #[test]
    fn all_clauses_dropped_means_always() {
        let cond = Condition::parse("{nope.b}='x'", &registry());
        assert!(cond.is_empty());
        assert!(cond.check(&source(Value::Null, Value::Null)));
    }

    #[test]
    fn parent_references_read_the_environment() {
        let reg = registry();
        let cond = Condition::parse("{$parent.doc_type}='Application'", &reg);
        assert_eq!(cond.clauses()[0].reference, Reference::Parent("doc_type".to_string()));
        assert_eq!(cond.settings().count(), 0);
        assert!(cond.check(&source(Value::Null, Value::Null)));

        let other = Condition::parse("{$parent.doc_type}='LinkedApplication'", &reg);
        assert!(!other.check(&source(Value::Null, Value::Null)));

        assert!(Condition::parse("{$parent.unknown}='x'", &reg).is_empty());
    }
}
