#[cfg(test)]
mod tests {
    use glob::glob;
    use mandelbrot_explorer::fractals::mandelbrot::{MandelbrotExplorer, MandelbrotParams};

    fn parse_all_parameter_files_or_panic(directory: &str) -> usize {
        let pattern = format!("{}/**/*.json", directory);
        let mut count = 0;

        // Each file must (1) parse and (2) describe a valid explorer.
        for entry in glob(&pattern).expect("Failed to read glob pattern") {
            match entry {
                Ok(path) => {
                    let params = MandelbrotParams::from_json_file(&path).unwrap_or_else(|err| {
                        panic!("Failed to parse parameter file: {:?}\n\n{}\n", path, err)
                    });
                    if let Err(err) = MandelbrotExplorer::new(&params) {
                        panic!("Invalid parameters in {:?}: {}", path, err);
                    }
                    count += 1;
                }
                Err(e) => panic!("Failed to read path: {:?}. Check permissions.", e),
            }
        }
        count
    }

    #[test]
    fn test_ensure_all_parameter_files_can_be_parsed() {
        let count = parse_all_parameter_files_or_panic("params");
        assert!(count >= 3, "expected sample parameter files, found {}", count);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let params = MandelbrotParams::from_json_str(
            r#"{
                "view": {
                    "resolution": [16, 9],
                    "world": { "center": [0.0, 0.0], "dimensions": [3.2, 1.8] }
                },
                "max_iterations": 10
            }"#,
        )
        .unwrap();
        assert!(!params.smoothing);
        assert!(params.normalize_escape_values);
        assert!(params.thread_count >= 1);
        assert!(params.hue_control_points.is_none());
        assert!(params.adaptive_iterations.is_none());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(MandelbrotParams::from_json_str("{ \"max_iterations\": 10 }").is_err());
        assert!(MandelbrotParams::from_json_file("params/does_not_exist.json").is_err());
    }
}
