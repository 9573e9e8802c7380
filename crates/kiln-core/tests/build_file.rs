use std::path::PathBuf;

use kiln_core::build_file::{BuildFile, DependencyDecl};
use kiln_core::constraint::VersionConstraint;
use kiln_core::dependency::DependencyDescriptor;
use kiln_core::error::ModelError;
use kiln_core::identity::ModuleIdentity;

const BUILD: &str = r#"
[project]
name = "app"
group = "com.example"
version = "0.3.0"

[configurations.implementation]
dependencies = [
    "org.slf4j:slf4j-api:1.7.36",
    { module = "com.google.guava:guava", version = "=32.1.0", optional = true, exclude = [{ group = "com.google.code.findbugs" }] },
    { project = ":fixtures" },
    { name = "vendored", files = ["libs/a.jar", "libs/b.jar"] },
]
exclude = [{ group = "commons-logging" }]
force = ["org.slf4j:slf4j-api:2.0.9"]
strict = ["junit:junit:4.13.2"]
substitute = [{ from = "log4j:log4j", to = "org.slf4j:log4j-over-slf4j", version = "2.0.9" }]

[configurations.runtime]
extends-from = ["implementation"]
dependencies = ["ch.qos.logback:logback-classic:[1.4,1.5)"]

[[modules]]
module = "org.slf4j:slf4j-api"
version = "2.0.9"
artifacts = ["slf4j-api-2.0.9.jar"]
revision = "r1"
"#;

#[test]
fn parses_every_dependency_form() {
    let build = BuildFile::parse_toml(BUILD).unwrap();
    assert_eq!(build.project.name, "app");
    assert_eq!(build.configurations.len(), 2);

    let implementation = &build.configurations["implementation"];
    assert!(matches!(implementation.dependencies[0], DependencyDecl::Short(_)));
    assert!(matches!(implementation.dependencies[1], DependencyDecl::Module { .. }));
    assert!(matches!(implementation.dependencies[2], DependencyDecl::Project { .. }));
    assert!(matches!(implementation.dependencies[3], DependencyDecl::Files { .. }));

    let runtime = &build.configurations["runtime"];
    assert_eq!(runtime.extends_from, ["implementation"]);

    assert_eq!(build.modules.len(), 1);
    assert_eq!(build.modules[0].revision.as_deref(), Some("r1"));
}

#[test]
fn converts_declarations_to_descriptors() {
    let build = BuildFile::parse_toml(BUILD).unwrap();
    let configuration = build.configurations["implementation"]
        .to_configuration("implementation", &build.project)
        .unwrap();

    let deps = &configuration.dependencies;
    assert_eq!(deps[0].constraint(), &VersionConstraint::required("1.7.36"));

    let guava = &deps[1];
    assert_eq!(guava.constraint(), &VersionConstraint::strict("32.1.0"));
    assert!(guava.is_optional());
    assert!(guava.excludes(&ModuleIdentity::new("com.google.code.findbugs", "jsr305")));

    let DependencyDescriptor::Project(project) = &deps[2] else {
        panic!("expected a project dependency");
    };
    assert_eq!(project.module, ModuleIdentity::new("com.example", "fixtures"));
    assert_eq!(project.constraint, VersionConstraint::strict("0.3.0"));

    let DependencyDescriptor::File(files) = &deps[3] else {
        panic!("expected a file dependency");
    };
    assert_eq!(files.module, ModuleIdentity::new("local-files", "vendored"));
    assert_eq!(files.files, [PathBuf::from("libs/a.jar"), PathBuf::from("libs/b.jar")]);
}

#[test]
fn converts_rules() {
    let build = BuildFile::parse_toml(BUILD).unwrap();
    let configuration = build.configurations["implementation"]
        .to_configuration("implementation", &build.project)
        .unwrap();
    let rules = &configuration.rules;

    let slf4j = ModuleIdentity::new("org.slf4j", "slf4j-api");
    assert_eq!(
        rules.constraint_for(&slf4j).unwrap().constraint,
        VersionConstraint::forced("2.0.9")
    );
    let junit = ModuleIdentity::new("junit", "junit");
    assert_eq!(
        rules.constraint_for(&junit).unwrap().constraint,
        VersionConstraint::strict("4.13.2")
    );

    let sub = rules
        .substitution_for(&ModuleIdentity::new("log4j", "log4j"))
        .unwrap();
    assert_eq!(sub.to, ModuleIdentity::new("org.slf4j", "log4j-over-slf4j"));
    assert_eq!(sub.constraint, Some(VersionConstraint::required("2.0.9")));

    assert!(rules
        .exclusion_for(&ModuleIdentity::new("commons-logging", "commons-logging"))
        .is_some());
}

#[test]
fn registry_freezes_into_model() {
    let build = BuildFile::parse_toml(BUILD).unwrap();
    let model = build.registry().unwrap().freeze().unwrap();

    let runtime = model.effective_dependencies("runtime").unwrap();
    assert_eq!(runtime.len(), 5);
    let (_, rules) = model.effective_rules("runtime").unwrap();
    assert_eq!(rules.constraints.len(), 2);
}

#[test]
fn registry_rejects_cycles() {
    let toml = r#"
[project]
name = "app"
version = "1.0"

[configurations.a]
extends-from = ["b"]

[configurations.b]
extends-from = ["a"]
"#;
    let build = BuildFile::parse_toml(toml).unwrap();
    assert!(matches!(
        build.registry(),
        Err(ModelError::CycleDetected { .. })
    ));
}

#[test]
fn registry_rejects_bad_notation() {
    let toml = r#"
[project]
name = "app"
version = "1.0"

[configurations.a]
dependencies = ["not-a-coordinate"]
"#;
    let build = BuildFile::parse_toml(toml).unwrap();
    assert!(matches!(
        build.registry(),
        Err(ModelError::InvalidNotation { .. })
    ));
}

#[test]
fn rejects_malformed_toml() {
    assert!(BuildFile::parse_toml("[project\nname = ").is_err());
}

#[test]
fn loads_from_path() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("Kiln.toml");
    std::fs::write(&path, BUILD).unwrap();

    let build = BuildFile::from_path(&path).unwrap();
    assert_eq!(build.project.version, "0.3.0");

    assert!(BuildFile::from_path(&tmp.path().join("missing.toml")).is_err());
}
