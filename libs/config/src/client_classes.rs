//! # Client Classes
//!
//! The boundary between the engine and classification is [`ClassEvaluator`]:
//! given the facts known about a client it returns the full [`ClassSet`]. The
//! engine calls it once before the reservation lookup and again after a
//! reservation added classes, each call recomputes the set from scratch so that
//! negated memberships like `not member('reserved_class')` stay correct.
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
};

use client_classification::{Args, Expr, Val};
use serde::Serialize;
use topo_sort::DependencyTree;
use tracing::{error, trace};

use crate::{error::ConfigError, reservations::ClientIdentifiers, wire};
pub use client_classification;

/// Classes a client belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClassSet(BTreeSet<String>);

impl ClassSet {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// A subnet, network or pool guard: no guard always matches, otherwise the
    /// class must be in the set.
    pub fn allows(&self, guard: Option<&str>) -> bool {
        guard.is_none_or(|class| self.contains(class))
    }
}

impl<S: Into<String>> FromIterator<S> for ClassSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ClassSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, name) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}")?;
        }
        write!(f, "]")
    }
}

/// Facts about a client used for classification
#[derive(Debug, Clone, Copy)]
pub struct ClassFacts<'a> {
    pub ids: &'a ClientIdentifiers,
    pub iface: Option<&'a str>,
    /// whether the client has a reservation, None before the lookup ran
    pub known: Option<bool>,
    /// classes assigned by the client's reservation
    pub reserved: &'a [String],
}

impl<'a> ClassFacts<'a> {
    /// facts before any reservation lookup
    pub fn new(ids: &'a ClientIdentifiers, iface: Option<&'a str>) -> Self {
        Self {
            ids,
            iface,
            known: None,
            reserved: &[],
        }
    }

    /// same facts once the reservation lookup resolved
    pub fn with_reservation(self, known: bool, reserved: &'a [String]) -> Self {
        Self {
            known: Some(known),
            reserved,
            ..self
        }
    }
}

/// Resolves the set of classes a client belongs to
pub trait ClassEvaluator {
    fn resolve_classes(&self, facts: &ClassFacts<'_>) -> ClassSet;
}

#[derive(Debug, Clone, Default)]
pub struct ClientClasses {
    classes: HashMap<String, ClientClass>,
    /// order of definition
    original_order: Vec<String>,
    /// `member` dependencies always come first
    topo_order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientClass {
    name: String,
    /// classes without a test are only assigned by reservations
    test: Option<Expr>,
}

impl TryFrom<Vec<wire::ClientClass>> for ClientClasses {
    type Error = ConfigError;

    fn try_from(cfg: Vec<wire::ClientClass>) -> Result<Self, Self::Error> {
        let mut dep_tree = DependencyTree::new();
        let mut classes = HashMap::new();
        let mut original_order = Vec::with_capacity(cfg.len());
        let mut deps_of = Vec::with_capacity(cfg.len());

        for class in cfg {
            if client_classification::is_builtin(&class.name) {
                return Err(ConfigError::BuiltinClass(class.name));
            }
            if classes.contains_key(&class.name) {
                return Err(ConfigError::DuplicateClass(class.name));
            }
            let test = class
                .test
                .as_deref()
                .map(client_classification::parse)
                .transpose()
                .map_err(|source| ConfigError::ClassExpr {
                    name: class.name.clone(),
                    source,
                })?;
            let deps = test
                .as_ref()
                .map(client_classification::get_class_dependencies)
                .unwrap_or_default()
                .into_iter()
                .filter(|dep| !client_classification::is_builtin(dep))
                .collect::<Vec<_>>();
            deps_of.push((class.name.clone(), deps.clone()));
            dep_tree.add(class.name.clone(), deps);
            original_order.push(class.name.clone());
            classes.insert(
                class.name.clone(),
                ClientClass {
                    name: class.name,
                    test,
                },
            );
        }
        // name the class with the bad reference rather than just the missing key
        for (class, deps) in deps_of {
            if let Some(missing) = deps.into_iter().find(|d| !classes.contains_key(d)) {
                return Err(ConfigError::UndefinedClass { class, missing });
            }
        }

        Ok(Self {
            classes,
            original_order,
            topo_order: dep_tree.topological_sort()?,
        })
    }
}

impl ClientClasses {
    pub fn find(&self, name: &str) -> Option<&ClientClass> {
        self.classes.get(name)
    }
    /// class names in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.original_order.iter().map(|s| s.as_str())
    }
    pub fn len(&self) -> usize {
        self.classes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassEvaluator for ClientClasses {
    fn resolve_classes(&self, facts: &ClassFacts<'_>) -> ClassSet {
        let ids = facts.ids;
        let mut member = HashSet::new();
        // every client is a member of "ALL"
        member.insert(client_classification::ALL_CLASS.to_owned());
        match facts.known {
            Some(true) => {
                member.insert(client_classification::KNOWN_CLASS.to_owned());
            }
            Some(false) => {
                member.insert(client_classification::UNKNOWN_CLASS.to_owned());
            }
            None => {}
        }
        member.extend(facts.reserved.iter().cloned());

        let mut args = Args {
            mac: ids.hw_address.as_deref(),
            client_id: ids.client_id.as_deref(),
            duid: ids.duid.as_deref(),
            circuit_id: ids.circuit_id.as_deref(),
            iface: facts.iface,
            member,
        };
        // classes are always eval'd in topological order, so a `member` test
        // sees the result of every class it depends on
        for name in &self.topo_order {
            let Some(class) = self.classes.get(name) else {
                continue;
            };
            if class.eval(&args) {
                args.member.insert(class.name.clone());
            }
        }

        args.member.into_iter().collect()
    }
}

impl ClientClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// false when there is no test or it doesn't evaluate to true
    pub fn eval(&self, args: &Args<'_>) -> bool {
        let Some(test) = &self.test else {
            return false;
        };
        trace!(name = ?self.name, expr = ?test, mac = ?args.mac, "evaluating expression");
        match client_classification::eval(test, args) {
            Ok(Val::Bool(b)) => b,
            res => {
                error!(name = ?self.name, ?res, "expression didn't evaluate to true/false");
                false
            }
        }
    }
}
