use std::sync::{Arc, Barrier};
use std::thread;

use mawrid_container::error::ErrorCategory;
use mawrid_container::prelude::*;

struct Alpha;

impl Injectable for Alpha {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Beta>()]
    }
    fn construct(_: &mut Arguments) -> Result<Self> {
        Ok(Alpha)
    }
}

struct Beta;

impl Injectable for Beta {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Alpha>()]
    }
    fn construct(_: &mut Arguments) -> Result<Self> {
        Ok(Beta)
    }
}

struct SelfReferencing;

impl Injectable for SelfReferencing {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<SelfReferencing>()]
    }
    fn construct(_: &mut Arguments) -> Result<Self> {
        Ok(SelfReferencing)
    }
}

struct Parent {
    child: ServiceFactory<Child>,
}

impl Injectable for Parent {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::factory::<Child>()]
    }
    fn construct(args: &mut Arguments) -> Result<Self> {
        Ok(Parent { child: args.factory()? })
    }
}

struct Child {
    _parent: Arc<Parent>,
}

impl Injectable for Child {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Parent>()]
    }
    fn construct(args: &mut Arguments) -> Result<Self> {
        Ok(Child { _parent: args.get()? })
    }
}

fn cyclic_container() -> Container {
    let container = Container::new();
    container.register::<Alpha, Alpha>(Lifestyle::Transient).unwrap();
    container.register::<Beta, Beta>(Lifestyle::Transient).unwrap();
    container
}

fn expect_cycle(result: Result<impl Sized>) -> Vec<TypeKey> {
    match result {
        Err(MawridError::CyclicDependency(e)) => e.path,
        Err(other) => panic!("Expected CyclicDependency, got: {other:?}"),
        Ok(_) => panic!("Expected CyclicDependency, got Ok"),
    }
}

#[test]
fn two_node_cycle_reports_full_path() {
    let container = cyclic_container();

    let path = expect_cycle(container.get_instance::<Alpha>());
    assert_eq!(
        path,
        vec![TypeKey::of::<Alpha>(), TypeKey::of::<Beta>(), TypeKey::of::<Alpha>()]
    );
}

#[test]
fn cycle_is_reported_again_on_retry() {
    let container = cyclic_container();

    expect_cycle(container.get_instance::<Beta>());
    let path = expect_cycle(container.get_instance::<Beta>());
    assert_eq!(
        path,
        vec![TypeKey::of::<Beta>(), TypeKey::of::<Alpha>(), TypeKey::of::<Beta>()]
    );
}

#[test]
fn direct_self_dependency() {
    let container = Container::new();
    container
        .register::<SelfReferencing, SelfReferencing>(Lifestyle::Singleton)
        .unwrap();

    let path = expect_cycle(container.get_instance::<SelfReferencing>());
    assert_eq!(path, vec![TypeKey::of::<SelfReferencing>(); 2]);
}

#[test]
fn verify_reports_the_cycle() {
    let container = cyclic_container();

    let error = container.verify().unwrap_err();
    assert_eq!(error.category(), ErrorCategory::CyclicDependency);
    assert!(format!("{error}").contains("Alpha → Beta → Alpha"));
    assert!(!container.is_verified());
}

#[test]
fn concurrent_callers_each_see_the_cycle() {
    let container = cyclic_container();
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                matches!(
                    container.get_instance::<Alpha>(),
                    Err(MawridError::CyclicDependency(_))
                )
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

#[test]
fn factory_dependency_breaks_the_cycle() {
    let container = Container::new();
    container.register::<Parent, Parent>(Lifestyle::Transient).unwrap();
    container.register::<Child, Child>(Lifestyle::Transient).unwrap();

    let parent = container.get_instance::<Parent>().unwrap();
    let first = parent.child.create().unwrap();
    let second = parent.child.create().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    container.verify().unwrap();
}
