//! Bean-construction hooks.
//!
//! Modifiers are registered on the provider and run, in registration
//! order, at fixed points of the bean-building pipeline. Each hook is a
//! pass-through by default, so an implementation overrides only the stages
//! it cares about.

use core::fmt;

use std::sync::Arc;

use crate::desc::{BeanDescription, PropertyDefinition};

use super::builder::BeanSerializerBuilder;
use super::ValueSerializer;

/// A hook into bean serializer construction.
pub trait SerializerModifier: Send + Sync + fmt::Debug {
    /// Runs after property collection; may add, remove or rewrite
    /// definitions.
    fn change_properties(
        &self,
        description: &BeanDescription,
        properties: Vec<PropertyDefinition>,
    ) -> Vec<PropertyDefinition> {
        let _ = description;
        properties
    }

    /// Runs after filtering; may reorder the surviving definitions.
    fn order_properties(
        &self,
        description: &BeanDescription,
        properties: Vec<PropertyDefinition>,
    ) -> Vec<PropertyDefinition> {
        let _ = description;
        properties
    }

    /// Runs on the fully configured builder, right before it builds.
    fn update_builder(
        &self,
        description: &BeanDescription,
        builder: BeanSerializerBuilder,
    ) -> BeanSerializerBuilder {
        let _ = description;
        builder
    }

    /// Runs on the finished serializer; may wrap or replace it.
    fn modify_serializer(
        &self,
        description: &BeanDescription,
        serializer: Arc<dyn ValueSerializer>,
    ) -> Arc<dyn ValueSerializer> {
        let _ = description;
        serializer
    }
}
