use kiln_core::constraint::VersionConstraint;
use kiln_core::dependency::{
    DependencyDescriptor, ExternalDependency, FileDependency, ProjectDependency, LOCAL_FILES_GROUP,
};
use kiln_core::identity::ModuleIdentity;
use kiln_core::rules::ExcludeRule;
use kiln_core::version::Version;

#[test]
fn external_notation_parse_valid() {
    let dep = DependencyDescriptor::external("com.example:my-lib:1.0.0").unwrap();
    assert_eq!(dep.identity(), &ModuleIdentity::new("com.example", "my-lib"));
    assert_eq!(dep.constraint(), &VersionConstraint::required("1.0.0"));
    assert!(!dep.is_optional());
}

#[test]
fn external_notation_keeps_constraint_prefix() {
    let dep = DependencyDescriptor::external("com.example:my-lib:=2.0").unwrap();
    assert_eq!(dep.constraint(), &VersionConstraint::strict("2.0"));
}

#[test]
fn external_notation_two_parts_is_error() {
    assert!(DependencyDescriptor::external("group:artifact").is_err());
}

#[test]
fn external_notation_empty_string_is_error() {
    assert!(DependencyDescriptor::external("").is_err());
}

#[test]
fn project_dependency_requests_its_version_strictly() {
    let dep = DependencyDescriptor::Project(ProjectDependency::new("com.example", ":fixtures", "1.2"));
    assert_eq!(dep.identity(), &ModuleIdentity::new("com.example", "fixtures"));
    assert_eq!(dep.constraint(), &VersionConstraint::strict("1.2"));
}

#[test]
fn file_dependency_has_synthetic_identity() {
    let dep = DependencyDescriptor::File(FileDependency::new("local", vec!["libs/a.jar".into()]));
    assert_eq!(dep.identity().group, LOCAL_FILES_GROUP);
    assert_eq!(dep.identity().name, "local");
    assert_eq!(
        dep.constraint(),
        &VersionConstraint::Strict(Version::unspecified())
    );
    assert!(!dep.excludes(&ModuleIdentity::new("any", "thing")));
}

#[test]
fn excludes_checks_own_rules() {
    let mut ext = ExternalDependency::new(
        ModuleIdentity::new("org.example", "app"),
        VersionConstraint::required("1.0"),
    );
    ext.excludes.push(ExcludeRule::group("commons-logging"));
    let dep = DependencyDescriptor::External(ext);
    assert!(dep.excludes(&ModuleIdentity::new("commons-logging", "commons-logging")));
    assert!(!dep.excludes(&ModuleIdentity::new("org.slf4j", "slf4j-api")));
}

#[test]
fn with_identity_and_constraint_copy() {
    let dep = DependencyDescriptor::external("a:b:1.0").unwrap();
    let moved = dep.with_identity(ModuleIdentity::new("c", "d"));
    let forced = moved.with_constraint(VersionConstraint::forced("2.0"));
    assert_eq!(dep.identity(), &ModuleIdentity::new("a", "b"));
    assert_eq!(forced.identity(), &ModuleIdentity::new("c", "d"));
    assert_eq!(forced.constraint(), &VersionConstraint::forced("2.0"));
}

#[test]
fn file_dependency_ignores_rewrites() {
    let dep = DependencyDescriptor::File(FileDependency::new("local", vec![]));
    let rewritten = dep
        .with_identity(ModuleIdentity::new("c", "d"))
        .with_constraint(VersionConstraint::forced("2.0"));
    assert_eq!(rewritten, dep);
}
