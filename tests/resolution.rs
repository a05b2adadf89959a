//! Typesafe resolution: alternatives, specialization, ambiguity and archives.

use std::sync::Arc;

use ferrous_beans::{
    BaseType, BeanBuilder, BeanDefinition, BeanError, BeanLookup, BeanManager, ClassHierarchy,
    ContainerBuilder, Qualifier, ResolutionKey,
};
use proptest::prelude::*;

fn bean(class: &str, types: &[&str]) -> BeanBuilder {
    BeanBuilder::new(class).types(types).constructor(vec![], |_| Ok(()))
}

fn manager(beans: Vec<BeanBuilder>) -> Arc<BeanManager> {
    let root = BeanManager::root(Arc::new(ClassHierarchy::new()));
    for b in beans {
        root.add_bean(Arc::new(b.build().unwrap()));
    }
    root
}

fn resolve(manager: &BeanManager, ty: &str, qualifiers: &[Qualifier]) -> Result<Arc<BeanDefinition>, BeanError> {
    manager.resolve(&ResolutionKey::new(BaseType::from(ty), qualifiers))
}

#[test]
fn enabled_alternative_wins() {
    let root = manager(vec![
        bean("Foo", &["Service"]),
        bean("FooAlt", &["Service"]).alternative(),
    ]);
    root.deployment_mut().enable_alternative("FooAlt");
    let resolved = resolve(&root, "Service", &[Qualifier::default_qualifier()]).unwrap();
    assert_eq!(resolved.bean_class(), "FooAlt");
}

#[test]
fn disabled_alternative_is_ignored() {
    let root = manager(vec![
        bean("Foo", &["Service"]),
        bean("FooAlt", &["Service"]).alternative(),
    ]);
    assert_eq!(resolve(&root, "Service", &[]).unwrap().bean_class(), "Foo");
}

#[test]
fn missing_bean_is_unsatisfied() {
    let root = manager(vec![bean("Foo", &["Service"])]);
    let err = resolve(&root, "Widget", &[Qualifier::default_qualifier()]).unwrap_err();
    assert!(matches!(err, BeanError::Unsatisfied { .. }), "{:?}", err);
}

#[test]
fn equal_candidates_are_ambiguous_and_listed_sorted() {
    let root = manager(vec![bean("B", &["Gadget"]), bean("A", &["Gadget"])]);
    match resolve(&root, "Gadget", &[Qualifier::default_qualifier()]) {
        Err(BeanError::Ambiguous { candidates, .. }) => {
            assert_eq!(candidates.len(), 2);
            assert!(candidates[0].contains("[A,"), "{:?}", candidates);
            assert!(candidates[1].contains("[B,"), "{:?}", candidates);
        }
        other => panic!("expected ambiguity, got {:?}", other),
    }
}

#[test]
fn qualifiers_narrow_the_candidates() {
    let root = manager(vec![
        bean("Fast", &["Gadget"]).qualifier(Qualifier::new("Fast")),
        bean("Slow", &["Gadget"]).qualifier(Qualifier::new("Slow")),
    ]);
    assert_eq!(
        resolve(&root, "Gadget", &[Qualifier::new("Slow")]).unwrap().bean_class(),
        "Slow"
    );
    // neither carries @Default once it has an explicit qualifier
    assert!(matches!(resolve(&root, "Gadget", &[]), Err(BeanError::Unsatisfied { .. })));
    assert!(matches!(
        resolve(&root, "Gadget", &[Qualifier::any()]),
        Err(BeanError::Ambiguous { .. })
    ));
}

#[test]
fn specialized_bean_is_never_returned() {
    let container = ContainerBuilder::new()
        .bean(bean("Mail", &["Mailer", "Mail"]).qualifier(Qualifier::new("Async")))
        .bean(bean("MockMail", &["Mailer", "Mail"]).specializes("Mail"))
        .build()
        .unwrap();

    // the qualifier is inherited, so asking with Mail's own qualifiers finds the replacement
    for ty in ["Mailer", "Mail"] {
        let resolved = container.resolve(ty, &[Qualifier::new("Async")]).unwrap();
        assert_eq!(resolved.bean_class(), "MockMail");
    }
    assert!(container.manager().is_specialized("Mail"));
}

#[test]
fn specializing_candidates_shadow_their_targets() {
    let root = manager(vec![
        bean("Mail", &["Mailer"]).qualifier(Qualifier::new("Async")),
        bean("MockMail", &["Mailer"])
            .qualifier(Qualifier::new("Async"))
            .specializes("Mail"),
    ]);
    let direct = resolve(&root, "Mailer", &[Qualifier::new("Async")]).unwrap();
    assert_eq!(direct.bean_class(), "MockMail");
}

#[test]
fn producers_break_ties_with_plain_beans() {
    let producer = ferrous_beans::ProducerBuilder::method(None, "Factory.gadget")
        .produce_static(|_| Ok(Some(1u8)))
        .build()
        .unwrap();
    let root = manager(vec![
        bean("Plain", &["Gadget"]),
        BeanBuilder::new("Factory.gadget").types(&["Gadget"]).producer(producer),
    ]);
    assert!(resolve(&root, "Gadget", &[]).unwrap().is_producer());
}

#[test]
fn local_beans_outrank_inherited_ones() {
    let root = manager(vec![bean("Shared", &["Clock"])]);
    let child = root.child("web");
    child.add_bean(Arc::new(bean("Local", &["Clock"]).archive("web").build().unwrap()));

    assert_eq!(resolve(&child, "Clock", &[]).unwrap().bean_class(), "Local");
    assert_eq!(resolve(&root, "Clock", &[]).unwrap().bean_class(), "Shared");
}

#[test]
fn parents_never_see_child_beans() {
    let root = manager(vec![]);
    let child = root.child("web");
    child.add_bean(Arc::new(bean("Local", &["Clock"]).archive("web").build().unwrap()));
    assert!(matches!(resolve(&root, "Clock", &[]), Err(BeanError::Unsatisfied { .. })));
}

#[test]
fn alternatives_enabled_by_their_own_archive_serve_children() {
    let root = manager(vec![bean("RootAlt", &["Clock"]).alternative()]);
    root.deployment_mut().enable_alternative("RootAlt");
    let child = root.child("web");

    assert_eq!(resolve(&root, "Clock", &[]).unwrap().bean_class(), "RootAlt");
    assert_eq!(resolve(&child, "Clock", &[]).unwrap().bean_class(), "RootAlt");

    // an enabled candidate in the child still takes precedence
    child.add_bean(Arc::new(bean("Local", &["Clock"]).archive("web").build().unwrap()));
    assert_eq!(resolve(&child, "Clock", &[]).unwrap().bean_class(), "Local");
}

#[test]
fn enabled_alternative_in_a_parent_beats_a_local_bean_only_through_priority() {
    let root = manager(vec![bean("ParentAlt", &["Clock"]).alternative().priority(5)]);
    let child = root.child("web");
    child.add_bean(Arc::new(bean("Local", &["Clock"]).archive("web").build().unwrap()));
    // local bonus outweighs any realistic priority
    assert_eq!(resolve(&child, "Clock", &[]).unwrap().bean_class(), "Local");
    assert_eq!(resolve(&root, "Clock", &[]).unwrap().bean_class(), "ParentAlt");
}

#[test]
fn later_list_entries_outrank_earlier_ones() {
    let root = manager(vec![
        bean("First", &["Clock"]).alternative(),
        bean("Second", &["Clock"]).alternative(),
    ]);
    root.deployment_mut().enable_alternative("First");
    root.deployment_mut().enable_alternative("Second");
    assert_eq!(resolve(&root, "Clock", &[]).unwrap().bean_class(), "Second");
}

#[test]
fn explicit_priority_collides_with_a_list_position() {
    // priority 0 and list index 0 both rank as 1
    let root = manager(vec![
        bean("Listed", &["Clock"]).alternative(),
        bean("Explicit", &["Clock"]).alternative().priority(0),
    ]);
    root.deployment_mut().enable_alternative("Listed");
    match resolve(&root, "Clock", &[]) {
        Err(BeanError::Ambiguous { candidates, .. }) => assert_eq!(candidates.len(), 2),
        other => panic!("expected a tie, got {:?}", other.map(|b| b.display())),
    }

    // one more step of priority breaks the tie
    let root = manager(vec![
        bean("Listed", &["Clock"]).alternative(),
        bean("Explicit", &["Clock"]).alternative().priority(1),
    ]);
    root.deployment_mut().enable_alternative("Listed");
    assert_eq!(resolve(&root, "Clock", &[]).unwrap().bean_class(), "Explicit");
}

#[test]
fn inherited_priority_can_reach_the_local_bonus() {
    let tied = manager(vec![bean("ParentAlt", &["Clock"]).alternative().priority(999_999)]);
    let child = tied.child("web");
    child.add_bean(Arc::new(bean("Local", &["Clock"]).archive("web").build().unwrap()));
    assert!(matches!(resolve(&child, "Clock", &[]), Err(BeanError::Ambiguous { .. })));

    let above = manager(vec![bean("ParentAlt", &["Clock"]).alternative().priority(1_000_000)]);
    let child = above.child("web");
    child.add_bean(Arc::new(bean("Local", &["Clock"]).archive("web").build().unwrap()));
    assert_eq!(resolve(&child, "Clock", &[]).unwrap().bean_class(), "ParentAlt");
}

#[test]
fn generic_types_resolve_by_argument() {
    let root = manager(vec![
        bean("StringList", &["List<String>"]),
        bean("IntList", &["List<Integer>"]),
    ]);
    assert_eq!(
        resolve(&root, "List<String>", &[]).unwrap().bean_class(),
        "StringList"
    );
    assert_eq!(resolve(&root, "List<Integer>", &[]).unwrap().bean_class(), "IntList");
}

#[test]
fn named_lookup_uses_the_default_name() {
    let container = ContainerBuilder::new()
        .bean(
            BeanBuilder::new("ShopService")
                .default_named()
                .constructor(vec![], |_| Ok("shop")),
        )
        .build()
        .unwrap();
    let shop = container.get_named::<&'static str>("shopService").unwrap();
    assert_eq!(*shop, "shop");
}

#[derive(Debug, Clone)]
struct Shape {
    class: String,
    ty: usize,
    qualifier: Option<usize>,
    alternative: bool,
}

fn specs() -> impl Strategy<Value = Vec<Shape>> {
    prop::collection::vec(
        (0usize..3, prop::option::of(0usize..2), any::<bool>()),
        1..8,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (ty, qualifier, alternative))| Shape {
                class: format!("Bean{}", i),
                ty,
                qualifier,
                alternative,
            })
            .collect()
    })
}

const TYPES: [&str; 3] = ["Alpha", "Beta", "Gamma"];
const QUALIFIERS: [&str; 2] = ["Red", "Blue"];

fn build(specs: &[Shape]) -> Arc<BeanManager> {
    let root = manager(vec![]);
    for spec in specs {
        let mut b = bean(&spec.class, &[TYPES[spec.ty]]);
        if let Some(q) = spec.qualifier {
            b = b.qualifier(Qualifier::new(QUALIFIERS[q]));
        }
        if spec.alternative {
            b = b.alternative();
            root.deployment_mut().enable_alternative(spec.class.as_str());
        }
        root.add_bean(Arc::new(b.build().unwrap()));
    }
    root
}

fn outcome(result: Result<Arc<BeanDefinition>, BeanError>) -> String {
    match result {
        Ok(bean) => bean.bean_class().to_string(),
        Err(BeanError::Unsatisfied { .. }) => "unsatisfied".to_string(),
        Err(BeanError::Ambiguous { candidates, .. }) => format!("ambiguous {:?}", candidates),
        Err(other) => format!("error {}", other),
    }
}

proptest! {
    #[test]
    fn resolution_is_deterministic(specs in specs(), ty in 0usize..3) {
        let root = build(&specs);
        let first = outcome(resolve(&root, TYPES[ty], &[]));
        for _ in 0..3 {
            prop_assert_eq!(&first, &outcome(resolve(&root, TYPES[ty], &[])));
        }
    }

    #[test]
    fn unrelated_beans_do_not_change_resolution(specs in specs(), ty in 0usize..3) {
        let root = build(&specs);
        let before = outcome(resolve(&root, TYPES[ty], &[]));
        root.add_bean(Arc::new(bean("Unrelated", &["Delta"]).build().unwrap()));
        prop_assert_eq!(before, outcome(resolve(&root, TYPES[ty], &[])));
    }
}
