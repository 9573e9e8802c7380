use std::sync::{Arc, Mutex};

use kiln_core::configuration::{Configuration, ConfigurationRegistry};
use kiln_core::constraint::VersionConstraint;
use kiln_core::dependency::DependencyDescriptor;
use kiln_core::error::ModelError;
use kiln_core::identity::ModuleIdentity;
use kiln_core::rules::{ExcludeRule, RuleSet};

fn dep(notation: &str) -> DependencyDescriptor {
    DependencyDescriptor::external(notation).unwrap()
}

fn constraint_of(deps: &[Arc<DependencyDescriptor>], module: &str) -> VersionConstraint {
    let id = ModuleIdentity::parse(module).unwrap();
    deps.iter()
        .find(|d| d.identity() == &id)
        .map(|d| d.constraint().clone())
        .unwrap()
}

#[test]
fn child_declaration_wins_over_parent() {
    let mut registry = ConfigurationRegistry::new();
    registry
        .register(Configuration::new("a").with_dependency(dep("org:x:1.0")))
        .unwrap();
    registry
        .register(
            Configuration::new("b")
                .extends("a")
                .with_dependency(dep("org:x:2.0")),
        )
        .unwrap();
    let model = registry.freeze().unwrap();

    let deps = model.effective_dependencies("b").unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(constraint_of(deps, "org:x"), VersionConstraint::required("2.0"));
}

#[test]
fn child_declaration_wins_even_when_lower() {
    let mut registry = ConfigurationRegistry::new();
    registry
        .register(Configuration::new("a").with_dependency(dep("org:x:2.0")))
        .unwrap();
    registry
        .register(
            Configuration::new("b")
                .extends("a")
                .with_dependency(dep("org:x:1.0")),
        )
        .unwrap();
    let model = registry.freeze().unwrap();

    let deps = model.effective_dependencies("b").unwrap();
    assert_eq!(constraint_of(deps, "org:x"), VersionConstraint::required("1.0"));
    // The parent itself is unaffected.
    let parent = model.effective_dependencies("a").unwrap();
    assert_eq!(constraint_of(parent, "org:x"), VersionConstraint::required("2.0"));
}

#[test]
fn strictest_constraint_wins_for_same_version() {
    let mut registry = ConfigurationRegistry::new();
    registry
        .register(Configuration::new("a").with_dependency(dep("org:x:=1.0")))
        .unwrap();
    registry
        .register(
            Configuration::new("b")
                .extends("a")
                .with_dependency(dep("org:x:1.0")),
        )
        .unwrap();
    let model = registry.freeze().unwrap();

    let deps = model.effective_dependencies("b").unwrap();
    assert_eq!(constraint_of(deps, "org:x"), VersionConstraint::strict("1.0"));
}

#[test]
fn strictest_constraint_wins_when_child_is_stricter() {
    let mut registry = ConfigurationRegistry::new();
    registry
        .register(Configuration::new("a").with_dependency(dep("org:x:~1.0")))
        .unwrap();
    registry
        .register(
            Configuration::new("b")
                .extends("a")
                .with_dependency(dep("org:x:!1.0")),
        )
        .unwrap();
    let model = registry.freeze().unwrap();

    let deps = model.effective_dependencies("b").unwrap();
    assert_eq!(constraint_of(deps, "org:x"), VersionConstraint::forced("1.0"));
}

#[test]
fn declaration_order_is_ancestors_first() {
    let mut registry = ConfigurationRegistry::new();
    registry
        .register(
            Configuration::new("base")
                .with_dependency(dep("org:a:1.0"))
                .with_dependency(dep("org:b:1.0")),
        )
        .unwrap();
    registry
        .register(
            Configuration::new("child")
                .extends("base")
                .with_dependency(dep("org:c:1.0"))
                .with_dependency(dep("org:a:3.0")),
        )
        .unwrap();
    let model = registry.freeze().unwrap();

    let names: Vec<String> = model
        .effective_dependencies("child")
        .unwrap()
        .iter()
        .map(|d| d.identity().name.clone())
        .collect();
    // `a` keeps its first position but carries the child's version.
    assert_eq!(names, ["a", "b", "c"]);
    let deps = model.effective_dependencies("child").unwrap();
    assert_eq!(constraint_of(deps, "org:a"), VersionConstraint::required("3.0"));
}

#[test]
fn nearest_ancestor_wins_in_deep_hierarchy() {
    let mut registry = ConfigurationRegistry::new();
    registry
        .register(Configuration::new("root").with_dependency(dep("org:x:1.0")))
        .unwrap();
    registry
        .register(
            Configuration::new("middle")
                .extends("root")
                .with_dependency(dep("org:x:1.5")),
        )
        .unwrap();
    registry
        .register(Configuration::new("leaf").extends("middle"))
        .unwrap();
    let model = registry.freeze().unwrap();

    let deps = model.effective_dependencies("leaf").unwrap();
    assert_eq!(constraint_of(deps, "org:x"), VersionConstraint::required("1.5"));
}

#[test]
fn diamond_keeps_first_declared_on_equal_distance() {
    let mut registry = ConfigurationRegistry::new();
    registry
        .register(Configuration::new("left").with_dependency(dep("org:x:1.0")))
        .unwrap();
    registry
        .register(Configuration::new("right").with_dependency(dep("org:x:2.0")))
        .unwrap();
    registry
        .register(Configuration::new("both").extends("left").extends("right"))
        .unwrap();
    let model = registry.freeze().unwrap();

    let deps = model.effective_dependencies("both").unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(constraint_of(deps, "org:x"), VersionConstraint::required("1.0"));
}

#[test]
fn cycle_rejected_at_registration() {
    let mut registry = ConfigurationRegistry::new();
    registry
        .register(Configuration::new("a").extends("b"))
        .unwrap();
    let err = registry
        .register(Configuration::new("b").extends("a"))
        .unwrap_err();
    assert_eq!(
        err,
        ModelError::CycleDetected {
            path: vec!["b".into(), "a".into(), "b".into()]
        }
    );
    assert_eq!(err.to_string(), "Configuration inheritance cycle: b -> a -> b");
    assert!(registry.get("b").is_none());
}

#[test]
fn self_extension_rejected() {
    let mut registry = ConfigurationRegistry::new();
    let err = registry
        .register(Configuration::new("a").extends("a"))
        .unwrap_err();
    assert!(matches!(err, ModelError::CycleDetected { ref path } if path == &["a", "a"]));
}

#[test]
fn longer_cycle_reports_full_path() {
    let mut registry = ConfigurationRegistry::new();
    registry.register(Configuration::new("a").extends("c")).unwrap();
    registry.register(Configuration::new("b").extends("a")).unwrap();
    let err = registry
        .register(Configuration::new("c").extends("b"))
        .unwrap_err();
    assert_eq!(
        err,
        ModelError::CycleDetected {
            path: vec!["c".into(), "b".into(), "a".into(), "c".into()]
        }
    );
}

#[test]
fn duplicate_names_rejected() {
    let mut registry = ConfigurationRegistry::new();
    registry.register(Configuration::new("a")).unwrap();
    assert!(matches!(
        registry.register(Configuration::new("a")),
        Err(ModelError::DuplicateConfiguration { .. })
    ));
}

#[test]
fn freeze_rejects_unknown_parent() {
    let mut registry = ConfigurationRegistry::new();
    registry
        .register(Configuration::new("a").extends("missing"))
        .unwrap();
    assert!(matches!(
        registry.freeze(),
        Err(ModelError::UnknownParent { .. })
    ));
}

#[test]
fn unknown_configuration_lookup_fails() {
    let model = ConfigurationRegistry::new().freeze().unwrap();
    assert!(matches!(
        model.effective_dependencies("nope"),
        Err(ModelError::UnknownConfiguration { .. })
    ));
}

#[test]
fn effective_rules_put_own_rules_first() {
    let mut parent_rules = RuleSet::new();
    parent_rules.excludes.push(ExcludeRule::group("log4j"));
    let mut child_rules = RuleSet::new();
    child_rules.excludes.push(ExcludeRule::group("junit"));

    let mut registry = ConfigurationRegistry::new();
    registry
        .register(Configuration::new("a").with_rules(parent_rules))
        .unwrap();
    registry
        .register(Configuration::new("b").extends("a").with_rules(child_rules))
        .unwrap();
    let model = registry.freeze().unwrap();

    let (_, rules) = model.effective_rules("b").unwrap();
    let groups: Vec<&str> = rules.excludes.iter().map(|e| e.group.as_str()).collect();
    assert_eq!(groups, ["junit", "log4j"]);

    let (a_id, _) = model.effective_rules("a").unwrap();
    let (b_id, _) = model.effective_rules("b").unwrap();
    assert_ne!(a_id, b_id);
}

#[test]
fn observers_see_each_registration() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let mut registry = ConfigurationRegistry::new();
    registry.on_register(move |name| sink.lock().unwrap().push(name.to_string()));
    registry.register(Configuration::new("a")).unwrap();
    registry.register(Configuration::new("b")).unwrap();
    let _ = registry.register(Configuration::new("a"));

    assert_eq!(*seen.lock().unwrap(), ["a", "b"]);
}
