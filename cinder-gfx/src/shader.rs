//! Up-front WGSL validation.
//!
//! Materials are validated with naga when they are created, so a broken
//! shader surfaces as [`GraphicsError::ShaderCompile`] with the full
//! diagnostic instead of a device-level validation failure later on.

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::{error::GraphicsError, graphics::MaterialDescriptor};

pub const VERTEX_ENTRY_POINT: &str = "vs_main";
pub const FRAGMENT_ENTRY_POINT: &str = "fs_main";

/// Parses and validates `descriptor.source`, returning the checked module.
pub fn validate_material(
    descriptor: &MaterialDescriptor<'_>,
) -> Result<naga::Module, GraphicsError> {
    let compile_error = |log: String| GraphicsError::ShaderCompile {
        label: descriptor.label.to_owned(),
        log,
    };

    let module = naga::front::wgsl::parse_str(descriptor.source)
        .map_err(|e| compile_error(e.emit_to_string(descriptor.source)))?;

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|e| compile_error(e.emit_to_string(descriptor.source)))?;

    for (name, stage) in [
        (VERTEX_ENTRY_POINT, naga::ShaderStage::Vertex),
        (FRAGMENT_ENTRY_POINT, naga::ShaderStage::Fragment),
    ] {
        let found = module
            .entry_points
            .iter()
            .any(|entry| entry.name == name && entry.stage == stage);
        if !found {
            return Err(compile_error(format!("missing {stage:?} entry point `{name}`")));
        }
    }

    debug_assert_eq!(
        vertex_input_count(&module),
        descriptor.vertex_format.attributes().len(),
        "vertex inputs of `{}` do not match its vertex format",
        descriptor.label
    );

    Ok(module)
}

/// Number of `@location` inputs consumed by the vertex entry point, looking
/// through struct arguments.
pub fn vertex_input_count(module: &naga::Module) -> usize {
    let Some(entry) = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == naga::ShaderStage::Vertex)
    else {
        return 0;
    };

    entry
        .function
        .arguments
        .iter()
        .map(|argument| match &argument.binding {
            Some(binding) => usize::from(matches!(binding, naga::Binding::Location { .. })),
            None => match &module.types[argument.ty].inner {
                naga::TypeInner::Struct { members, .. } => members
                    .iter()
                    .filter(|member| {
                        matches!(member.binding, Some(naga::Binding::Location { .. }))
                    })
                    .count(),
                _ => 0,
            },
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::{AttributeType, VertexFormat};

    const QUAD: &str = r#"
struct Uniforms {
    tint: vec4<f32>,
}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> @builtin(position) vec4<f32> {
    return vec4<f32>(input.position + input.uv * 0.0, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return uniforms.tint;
}
"#;

    fn descriptor(source: &str) -> MaterialDescriptor<'_> {
        MaterialDescriptor {
            label: "quad",
            vertex_format: VertexFormat::new()
                .add("position", AttributeType::Float, 2)
                .add("uv", AttributeType::Float, 2),
            source,
            uniform_size: 16,
            texture_count: 0,
        }
    }

    #[test]
    fn accepts_valid_module() {
        let module = validate_material(&descriptor(QUAD)).unwrap();
        assert_eq!(vertex_input_count(&module), 2);
    }

    #[test]
    fn reports_parse_errors_with_label() {
        let source = QUAD.replace("return uniforms.tint;", "return uniforms.tint");
        match validate_material(&descriptor(&source)) {
            Err(GraphicsError::ShaderCompile { label, log }) => {
                assert_eq!(label, "quad");
                assert!(!log.is_empty());
            }
            other => panic!("expected a compile error, got {other:?}"),
        }
    }

    #[test]
    fn requires_both_entry_points() {
        let source = QUAD.replace("fn fs_main", "fn fragment_main");
        let err = validate_material(&descriptor(&source)).unwrap_err();
        assert!(err.to_string().contains("fs_main"));
    }
}
