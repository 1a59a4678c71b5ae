use std::sync::Arc;

use mawrid_container::prelude::*;

trait Logger: Send + Sync {}

struct ConsoleLogger;

impl Logger for ConsoleLogger {}

impl Injectable for ConsoleLogger {
    fn construct(_: &mut Arguments) -> Result<Self> {
        Ok(ConsoleLogger)
    }
}

struct ReportGenerator {
    _logger: Arc<dyn Logger>,
}

impl Injectable for ReportGenerator {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<dyn Logger>()]
    }
    fn construct(args: &mut Arguments) -> Result<Self> {
        Ok(ReportGenerator { _logger: args.get()? })
    }
}

/// Wraps every logger; registered as a decorator.
struct TimedLogger {
    _inner: Arc<dyn Logger>,
}

impl Logger for TimedLogger {}

impl Injectable for TimedLogger {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<dyn Logger>()]
    }
    fn construct(args: &mut Arguments) -> Result<Self> {
        Ok(TimedLogger { _inner: args.get()? })
    }
}

trait Store: Send + Sync {}

struct Cache;

impl Store for Cache {}

impl Injectable for Cache {
    fn construct(_: &mut Arguments) -> Result<Self> {
        Ok(Cache)
    }
}

mawrid_container::implements!(ConsoleLogger => dyn Logger, TimedLogger => dyn Logger, Cache => dyn Store);

fn analyzed(container: &Container) -> DiagnosticReport {
    container.verify().unwrap();
    container.analyze().unwrap()
}

fn mismatched() -> Container {
    let container = Container::new();
    container
        .register::<dyn Logger, ConsoleLogger>(Lifestyle::Transient)
        .unwrap();
    container
        .register::<ReportGenerator, ReportGenerator>(Lifestyle::Singleton)
        .unwrap();
    container
}

#[test]
fn singleton_depending_on_transient_is_one_mismatch() {
    let report = analyzed(&mismatched());

    assert_eq!(report.len(), 1);
    let mismatches = report.of_kind(DiagnosticKind::LifestyleMismatch);
    assert_eq!(mismatches.len(), 1);

    let finding = mismatches[0];
    assert!(finding.service.is::<ReportGenerator>());
    assert!(finding.implementation.is::<ReportGenerator>());
    assert_eq!(finding.related, vec![TypeKey::of::<ConsoleLogger>()]);
    assert_eq!(finding.severity, DiagnosticSeverity::Warning);
    assert!(finding.description.contains("ReportGenerator (Singleton) depends on dyn Logger implemented by ConsoleLogger"));
}

#[test]
fn transient_decorator_shortens_a_singleton_dependency() {
    let container = Container::new();
    container
        .register::<dyn Logger, ConsoleLogger>(Lifestyle::Singleton)
        .unwrap();
    container
        .register_decorator::<dyn Logger, TimedLogger>(Lifestyle::Transient)
        .unwrap();
    container
        .register::<ReportGenerator, ReportGenerator>(Lifestyle::Singleton)
        .unwrap();

    let report = analyzed(&container);
    let mismatches = report.of_kind(DiagnosticKind::LifestyleMismatch);
    assert_eq!(mismatches.len(), 1);
    assert!(mismatches[0].implementation.is::<ReportGenerator>());
    assert_eq!(mismatches[0].related, vec![TypeKey::of::<TimedLogger>()]);
    assert!(mismatches[0].description.contains("implemented by TimedLogger (Transient)"));

    let logger = container.get_registration::<dyn Logger>().unwrap();
    assert_eq!(*logger.effective_lifestyle(), Lifestyle::Transient);
    assert_eq!(*logger.lifestyle(), Lifestyle::Singleton);
}

#[test]
fn singleton_decorator_over_transient_is_reported_on_the_layer() {
    let container = Container::new();
    container
        .register::<dyn Logger, ConsoleLogger>(Lifestyle::Transient)
        .unwrap();
    container
        .register_decorator::<dyn Logger, TimedLogger>(Lifestyle::Singleton)
        .unwrap();
    container
        .register::<ReportGenerator, ReportGenerator>(Lifestyle::Singleton)
        .unwrap();

    let report = analyzed(&container);
    let mismatches = report.of_kind(DiagnosticKind::LifestyleMismatch);
    assert_eq!(mismatches.len(), 1);
    assert!(mismatches[0].implementation.is::<TimedLogger>());
    assert_eq!(mismatches[0].related, vec![TypeKey::of::<ConsoleLogger>()]);
}

#[test]
fn suppressed_mismatch_is_not_reported() {
    let container = mismatched();
    container
        .get_registration::<ReportGenerator>()
        .unwrap()
        .registration()
        .suppress_diagnostic_warning(DiagnosticKind::LifestyleMismatch, "logger is stateless");

    assert!(analyzed(&container).is_empty());
}

#[test]
fn shorter_consumer_is_fine() {
    let container = Container::new();
    container
        .register::<dyn Logger, ConsoleLogger>(Lifestyle::Singleton)
        .unwrap();
    container
        .register::<ReportGenerator, ReportGenerator>(Lifestyle::Scoped)
        .unwrap();

    assert!(analyzed(&container).of_kind(DiagnosticKind::LifestyleMismatch).is_empty());
}

#[test]
fn disposable_transient_is_reported() {
    struct Temp;
    impl Disposable for Temp {
        fn dispose(&self) {}
    }
    impl Injectable for Temp {
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Temp)
        }
        fn disposer() -> Option<fn(&Self)> {
            Some(<Self as Disposable>::dispose)
        }
    }

    let container = Container::new();
    container.register::<Temp, Temp>(Lifestyle::Transient).unwrap();

    let report = analyzed(&container);
    let findings = report.of_kind(DiagnosticKind::DisposableTransientComponent);
    assert_eq!(findings.len(), 1);
    assert!(findings[0].implementation.is::<Temp>());
}

#[test]
fn one_implementation_with_two_lifestyles_is_ambiguous() {
    let container = Container::new();
    container.register::<Cache, Cache>(Lifestyle::Singleton).unwrap();
    container.register::<dyn Store, Cache>(Lifestyle::Transient).unwrap();

    let report = analyzed(&container);
    let findings = report.of_kind(DiagnosticKind::AmbiguousLifestyles);
    assert_eq!(findings.len(), 1);
    assert!(findings[0].implementation.is::<Cache>());
    assert_eq!(findings[0].related.len(), 2);
    assert!(report.of_kind(DiagnosticKind::TornLifestyle).is_empty());
}

#[test]
fn separate_cached_registrations_are_torn() {
    let container = Container::new();
    container.register::<Cache, Cache>(Lifestyle::Singleton).unwrap();
    container.register::<dyn Store, Cache>(Lifestyle::Singleton).unwrap();

    let report = analyzed(&container);
    assert_eq!(report.of_kind(DiagnosticKind::TornLifestyle).len(), 1);
    assert!(report.of_kind(DiagnosticKind::AmbiguousLifestyles).is_empty());

    let direct = container.get_instance::<Cache>().unwrap();
    let through_store = container.get_instance::<dyn Store>().unwrap();
    assert_ne!(
        Arc::as_ptr(&direct) as *const u8,
        Arc::as_ptr(&through_store) as *const u8
    );
}

#[test]
fn shared_registration_is_not_torn() {
    let container = Container::new();
    let registration = Lifestyle::Singleton.create_registration::<dyn Store, Cache>(&container);
    container
        .register_registration(TypeKey::of::<dyn Store>(), registration.clone())
        .unwrap();
    container
        .register_registration(TypeKey::of::<Box<dyn Store>>(), registration)
        .unwrap();

    assert!(analyzed(&container).of_kind(DiagnosticKind::TornLifestyle).is_empty());
}

macro_rules! leaves {
    ($($name:ident),+) => {
        $(
            struct $name;
            impl Injectable for $name {
                fn construct(_: &mut Arguments) -> Result<Self> {
                    Ok($name)
                }
            }
        )+
    };
}

leaves!(D1, D2, D3, D4, D5, D6, D7, D8);

struct Everything;

impl Injectable for Everything {
    fn dependencies() -> Vec<Dependency> {
        vec![
            Dependency::concrete::<D1>(),
            Dependency::concrete::<D2>(),
            Dependency::concrete::<D3>(),
            Dependency::concrete::<D4>(),
            Dependency::concrete::<D5>(),
            Dependency::concrete::<D6>(),
            Dependency::concrete::<D7>(),
            Dependency::concrete::<D8>(),
        ]
    }
    fn construct(_: &mut Arguments) -> Result<Self> {
        Ok(Everything)
    }
}

struct Almost;

impl Injectable for Almost {
    fn dependencies() -> Vec<Dependency> {
        vec![
            Dependency::concrete::<D1>(),
            Dependency::concrete::<D2>(),
            Dependency::concrete::<D3>(),
            Dependency::concrete::<D4>(),
            Dependency::concrete::<D5>(),
            Dependency::concrete::<D6>(),
            Dependency::concrete::<D7>(),
            // Repeats do not count.
            Dependency::concrete::<D7>(),
        ]
    }
    fn construct(_: &mut Arguments) -> Result<Self> {
        Ok(Almost)
    }
}

#[test]
fn too_many_dependencies_is_information() {
    let container = Container::new();
    container.register::<Everything, Everything>(Lifestyle::Transient).unwrap();
    container.register::<Almost, Almost>(Lifestyle::Transient).unwrap();

    let report = analyzed(&container);
    let findings = report.of_kind(DiagnosticKind::SingleResponsibilityViolation);
    assert_eq!(findings.len(), 1);
    assert!(findings[0].implementation.is::<Everything>());
    assert_eq!(findings[0].related.len(), 8);
    assert_eq!(findings[0].severity, DiagnosticSeverity::Information);
    assert!(report.warnings().is_empty());
}

#[test]
fn implicitly_registered_dependency_is_reported() {
    struct Clock;
    impl Injectable for Clock {
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Clock)
        }
    }

    struct Scheduler;
    impl Injectable for Scheduler {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::concrete::<Clock>()]
        }
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Scheduler)
        }
    }

    let container = Container::new();
    container.register::<Scheduler, Scheduler>(Lifestyle::Transient).unwrap();

    let report = analyzed(&container);
    assert_eq!(report.len(), 1);
    let findings = report.of_kind(DiagnosticKind::ContainerRegistered);
    assert_eq!(findings.len(), 1);
    assert!(findings[0].service.is::<Clock>());
}

#[test]
fn analysis_requires_verification() {
    let container = mismatched();
    assert!(matches!(container.analyze(), Err(MawridError::NotVerified)));
}

#[test]
fn report_serializes_to_json() {
    let report = analyzed(&mismatched());
    let json = serde_json::to_value(&report).unwrap();

    let finding = &json["results"][0];
    assert_eq!(finding["kind"], "LifestyleMismatch");
    assert_eq!(finding["severity"], "Warning");
    assert!(finding["related"][0].as_str().unwrap().ends_with("ConsoleLogger"));
}
