use anyhow::{Context as _, Result};
use colored::Colorize;
use resgraph::{FieldDescriptor, Registry, ResourceTypeDescriptor};

use crate::Context;
use crate::resource;
use crate::ui;

pub fn run(_ctx: &Context, name: Option<&str>, json: bool) -> Result<()> {
    let registry = resource::registry();
    let descriptors = select(&registry, name)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&descriptors).context("Failed to serialize schema")?
        );
        return Ok(());
    }

    ui::header("Resources");
    for descriptor in descriptors {
        print_descriptor(descriptor);
    }
    Ok(())
}

fn select<'a>(
    registry: &'a Registry,
    name: Option<&str>,
) -> Result<Vec<&'a ResourceTypeDescriptor>> {
    match name {
        Some(name) => Ok(vec![registry.lookup(name)?.descriptor()]),
        None => Ok(registry.descriptors().collect()),
    }
}

fn print_descriptor(descriptor: &ResourceTypeDescriptor) {
    let title = if descriptor.is_singleton() {
        format!("{} {}", descriptor.name, "(singleton)".dimmed())
    } else {
        descriptor.name.clone()
    };
    ui::section(&title);
    if let Some(doc) = &descriptor.doc {
        ui::dim(doc);
    }
    if !descriptor.requires.is_empty() {
        let requires: Vec<String> = descriptor.requires.iter().map(ToString::to_string).collect();
        ui::dim(&format!("requires {}", requires.join(", ")));
    }
    for field in &descriptor.fields {
        ui::kv(&field.name, &field_summary(field));
    }
}

fn field_summary(field: &FieldDescriptor) -> String {
    match (field.identity, field.computed) {
        (true, _) => format!("{} {}", field.value_type, "key".cyan()),
        (false, false) => format!("{} {}", field.value_type, "arg".dimmed()),
        (false, true) => field.value_type.to_string(),
    }
}
