//! WGSL programs.
//!
//! `advect.wgsl` is the GPU form of [`crate::advect::advect_particle`] and
//! must evaluate the same rules in the same order. `lines.wgsl` is the
//! instanced line primitive used to draw the particle trails.

/// Compute program that writes the youngest cohort.
pub const TRANSFORM_SOURCE: &str = include_str!("shaders/advect.wgsl");

/// Vertex/fragment program that draws one segment per record.
pub const LINE_SOURCE: &str = include_str!("shaders/lines.wgsl");

/// Must match `@workgroup_size` in `advect.wgsl`.
pub const TRANSFORM_WORKGROUP_SIZE: u32 = 64;

/// Number of workgroups needed to cover one cohort.
pub fn transform_workgroups(num_particles: u32) -> u32 {
    num_particles.div_ceil(TRANSFORM_WORKGROUP_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates WGSL code using naga.
    fn validate_wgsl(code: &str) -> Result<naga::Module, String> {
        let module = naga::front::wgsl::parse_str(code)
            .map_err(|e| format!("WGSL parse error: {}", e.emit_to_string(code)))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(module)
    }

    fn entry_points(module: &naga::Module) -> Vec<(String, naga::ShaderStage)> {
        module
            .entry_points
            .iter()
            .map(|ep| (ep.name.clone(), ep.stage))
            .collect()
    }

    #[test]
    fn test_transform_wgsl_validates() {
        let module = validate_wgsl(TRANSFORM_SOURCE).expect("transform WGSL should be valid");
        let eps = entry_points(&module);
        assert_eq!(eps, vec![("main".to_string(), naga::ShaderStage::Compute)]);
        assert_eq!(
            module.entry_points[0].workgroup_size,
            [TRANSFORM_WORKGROUP_SIZE, 1, 1]
        );
    }

    #[test]
    fn test_line_wgsl_validates() {
        let module = validate_wgsl(LINE_SOURCE).expect("line WGSL should be valid");
        let eps = entry_points(&module);
        assert!(eps.contains(&("vs_main".to_string(), naga::ShaderStage::Vertex)));
        assert!(eps.contains(&("fs_main".to_string(), naga::ShaderStage::Fragment)));
    }

    #[test]
    fn test_transform_params_block_size() {
        let module = validate_wgsl(TRANSFORM_SOURCE).unwrap();
        let (_, ty) = module
            .types
            .iter()
            .find(|(_, ty)| ty.name.as_deref() == Some("TransformParams"))
            .expect("TransformParams struct");
        match ty.inner {
            naga::TypeInner::Struct { span, .. } => {
                assert_eq!(span as usize, std::mem::size_of::<crate::advect::TransformParams>())
            }
            _ => panic!("TransformParams is not a struct"),
        }
    }

    #[test]
    fn test_workgroups_cover_cohort() {
        assert_eq!(transform_workgroups(1), 1);
        assert_eq!(transform_workgroups(64), 1);
        assert_eq!(transform_workgroups(65), 2);
        assert_eq!(transform_workgroups(5000), 79);
    }
}
