use kiln_util::errors::KilnError;

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = KilnError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_build_file_error_display() {
    let err = KilnError::BuildFile {
        message: "bad syntax".to_string(),
    };
    assert_eq!(err.to_string(), "Build file error: bad syntax");
}

#[test]
fn test_resolution_error_display() {
    let err = KilnError::Resolution {
        message: "conflict".to_string(),
    };
    assert_eq!(err.to_string(), "Dependency resolution failed: conflict");
}

#[test]
fn test_generic_error_display() {
    let err = KilnError::Generic {
        message: "something broke".to_string(),
    };
    assert_eq!(err.to_string(), "something broke");
}

#[test]
fn test_io_error_from_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let kiln_err: KilnError = io_err.into();
    assert!(matches!(kiln_err, KilnError::Io(_)));
}
