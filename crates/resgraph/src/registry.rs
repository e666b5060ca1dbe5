//! Resource type registry.
//!
//! A [`ResourceType`] is the static schema of one resource: its fields with
//! their declared [`ValueType`]s, which of them contribute to identity, the
//! resolvers that compute the rest, and an optional `init` hook that runs
//! before construction. Types are assembled with [`ResourceType::builder`]
//! and collected into a [`Registry`], which is immutable once handed to a
//! runtime and can be shared by any number of runtimes.
//!
//! ```
//! use resgraph::{Registry, ResourceType, Value, ValueType};
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     ResourceType::builder("greeting")
//!         .key("name", ValueType::String)
//!         .field("text", ValueType::String, |_rt, res| {
//!             Ok(Value::from(format!("hello {}", res.string("name")?)))
//!         })
//!         .build(),
//! );
//! assert!(registry.get("greeting").is_some());
//! ```

use crate::error::{ResourceError, Result};
use crate::resource::{Args, Resource, Seeds};
use crate::runtime::Runtime;
use crate::value::{Value, ValueType};
use provider::Capability;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Computes one field of an instance
pub type Resolver = Arc<dyn Fn(&Runtime, &Arc<Resource>) -> Result<Value> + Send + Sync>;

/// Runs before construction with the raw constructor arguments
pub type InitFn = Arc<dyn Fn(&Runtime, Args) -> Result<Init> + Send + Sync>;

/// Computes the identity key from seeded arguments
pub type IdentityFn = Arc<dyn Fn(&Seeds<'_>) -> Result<String> + Send + Sync>;

/// Outcome of a type's `init` hook.
#[derive(Debug)]
pub enum Init {
    /// An already materialized instance satisfies the request
    Existing(Arc<Resource>),
    /// Construct from these (possibly completed) arguments
    Construct(Args),
    /// The hook could not decide; construct from the arguments as given
    Insufficient(Args),
}

/// Schema of one field
#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Contributes to the instance identity
    pub identity: bool,
    /// Has a resolver (as opposed to being seed-only)
    pub computed: bool,
}

/// Schema of one resource type
#[derive(Debug, Clone, Serialize)]
pub struct ResourceTypeDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Capability>,
}

impl ResourceTypeDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn identity_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.identity)
    }

    /// A type without identity contributors has one instance per runtime
    pub fn is_singleton(&self) -> bool {
        self.identity_fields().next().is_none()
    }
}

/// A registered resource type
pub struct ResourceType {
    descriptor: ResourceTypeDescriptor,
    init: Option<InitFn>,
    identity: Option<IdentityFn>,
    resolvers: HashMap<String, Resolver>,
}

impl ResourceType {
    pub fn builder(name: &str) -> ResourceTypeBuilder {
        ResourceTypeBuilder {
            descriptor: ResourceTypeDescriptor {
                name: name.to_string(),
                doc: None,
                fields: Vec::new(),
                requires: Vec::new(),
            },
            init: None,
            identity: None,
            resolvers: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ResourceTypeDescriptor {
        &self.descriptor
    }

    pub fn resolver(&self, field: &str) -> Option<&Resolver> {
        self.resolvers.get(field)
    }

    pub(crate) fn init(&self) -> Option<&InitFn> {
        self.init.as_ref()
    }

    /// Compute the identity key from constructor arguments.
    ///
    /// Without a custom identity function the key is the identity
    /// contributors' values joined with `\0`; every contributor must be
    /// present.
    pub fn compute_identity(&self, seeds: &Seeds<'_>) -> Result<String> {
        if let Some(identity) = &self.identity {
            return identity(seeds);
        }
        let parts = self
            .descriptor
            .identity_fields()
            .map(|f| seeds.require(&f.name).map(ToString::to_string))
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join("\0"))
    }
}

impl std::fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceType")
            .field("descriptor", &self.descriptor)
            .field("init", &self.init.is_some())
            .field("identity", &self.identity.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResourceType`]
pub struct ResourceTypeBuilder {
    descriptor: ResourceTypeDescriptor,
    init: Option<InitFn>,
    identity: Option<IdentityFn>,
    resolvers: HashMap<String, Resolver>,
}

impl ResourceTypeBuilder {
    pub fn doc(mut self, doc: &str) -> Self {
        self.descriptor.doc = Some(doc.to_string());
        self
    }

    /// Declare an identity contributor. Keys are always seeded.
    pub fn key(self, name: &str, value_type: ValueType) -> Self {
        self.push(name, value_type, true, false)
    }

    /// Declare a seed-only field
    pub fn arg(self, name: &str, value_type: ValueType) -> Self {
        self.push(name, value_type, false, false)
    }

    /// Declare a computed field.
    ///
    /// The field may still be seeded through constructor arguments, in
    /// which case the resolver never runs.
    pub fn field<F>(mut self, name: &str, value_type: ValueType, resolver: F) -> Self
    where
        F: Fn(&Runtime, &Arc<Resource>) -> Result<Value> + Send + Sync + 'static,
    {
        self.resolvers.insert(name.to_string(), Arc::new(resolver));
        self.push(name, value_type, false, true)
    }

    pub fn requires(mut self, capability: Capability) -> Self {
        if !self.descriptor.requires.contains(&capability) {
            self.descriptor.requires.push(capability);
        }
        self
    }

    pub fn init<F>(mut self, init: F) -> Self
    where
        F: Fn(&Runtime, Args) -> Result<Init> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    pub fn identity<F>(mut self, identity: F) -> Self
    where
        F: Fn(&Seeds<'_>) -> Result<String> + Send + Sync + 'static,
    {
        self.identity = Some(Arc::new(identity));
        self
    }

    pub fn build(self) -> ResourceType {
        ResourceType {
            descriptor: self.descriptor,
            init: self.init,
            identity: self.identity,
            resolvers: self.resolvers,
        }
    }

    fn push(mut self, name: &str, value_type: ValueType, identity: bool, computed: bool) -> Self {
        if let Some(existing) = self.descriptor.fields.iter_mut().find(|f| f.name == name) {
            existing.value_type = value_type;
            existing.identity |= identity;
            existing.computed |= computed;
        } else {
            self.descriptor.fields.push(FieldDescriptor {
                name: name.to_string(),
                value_type,
                identity,
                computed,
            });
        }
        self
    }
}

/// Collection of resource types, keyed by name
#[derive(Debug, Default, Clone)]
pub struct Registry {
    types: BTreeMap<String, Arc<ResourceType>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type, replacing any previous type with the same name.
    pub fn register(&mut self, resource_type: ResourceType) -> &mut Self {
        let name = resource_type.name().to_string();
        if self
            .types
            .insert(name.clone(), Arc::new(resource_type))
            .is_some()
        {
            log::warn!("registry> resource '{name}' registered twice, keeping the latest");
        }
        self
    }

    /// Merge another registry into this one. Types in `other` win.
    pub fn merge(&mut self, other: Registry) -> &mut Self {
        for (name, resource_type) in other.types {
            if self.types.insert(name.clone(), resource_type).is_some() {
                log::debug!("registry> '{name}' overridden by merged registry");
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ResourceType>> {
        self.types.get(name)
    }

    pub fn lookup(&self, name: &str) -> Result<&Arc<ResourceType>> {
        self.get(name)
            .ok_or_else(|| ResourceError::UnknownResource(name.to_string()))
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ResourceTypeDescriptor> {
        self.types.values().map(|t| t.descriptor())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
