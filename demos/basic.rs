//! Basic example of the Mawrid container.
//!
//! Run with `cargo run -p mawrid --example basic`.

use std::sync::Arc;

use mawrid::prelude::*;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

impl Injectable for ConsoleLogger {
    fn construct(_: &mut Arguments) -> Result<Self> {
        Ok(ConsoleLogger)
    }
}

/// Prefixes every line; registered as a decorator around any `dyn Logger`.
struct PrefixedLogger {
    inner: Arc<dyn Logger>,
}

impl Logger for PrefixedLogger {
    fn log(&self, msg: &str) {
        self.inner.log(&format!("app | {msg}"));
    }
}

impl Injectable for PrefixedLogger {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<dyn Logger>()]
    }
    fn construct(args: &mut Arguments) -> Result<Self> {
        Ok(PrefixedLogger { inner: args.get()? })
    }
}

struct Config {
    database_url: String,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

impl Injectable for Database {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Config>(), Dependency::on::<dyn Logger>()]
    }
    fn construct(args: &mut Arguments) -> Result<Self> {
        let config: Arc<Config> = args.get()?;
        Ok(Database {
            url: config.database_url.clone(),
            logger: args.get()?,
        })
    }
    fn disposer() -> Option<fn(&Self)> {
        Some(<Self as Disposable>::dispose)
    }
}

impl Disposable for Database {
    fn dispose(&self) {
        println!("🔌 Closing connection to {}", self.url);
    }
}

trait Validator: Send + Sync {
    fn check(&self, id: u64) -> bool;
}

struct NonZero;

impl Validator for NonZero {
    fn check(&self, id: u64) -> bool {
        id != 0
    }
}

impl Injectable for NonZero {
    fn construct(_: &mut Arguments) -> Result<Self> {
        Ok(NonZero)
    }
}

struct Below(u64);

impl Validator for Below {
    fn check(&self, id: u64) -> bool {
        id < self.0
    }
}

struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

impl Injectable for UserRepository {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Database>()]
    }
    fn construct(args: &mut Arguments) -> Result<Self> {
        Ok(UserRepository { db: args.get()? })
    }
}

struct UserService {
    repo: Arc<UserRepository>,
    validators: Collection<dyn Validator>,
    logger: Arc<dyn Logger>,
}

impl UserService {
    fn get_user(&self, id: u64) -> Result<String> {
        for validator in self.validators.iter() {
            if !validator?.check(id) {
                return Ok(format!("user {id} rejected"));
            }
        }
        self.logger.log(&format!("Getting user {id}"));
        Ok(self.repo.find_user(id))
    }
}

impl Injectable for UserService {
    fn dependencies() -> Vec<Dependency> {
        vec![
            Dependency::on::<UserRepository>(),
            Dependency::collection::<dyn Validator>(),
            Dependency::on::<dyn Logger>(),
        ]
    }
    fn construct(args: &mut Arguments) -> Result<Self> {
        Ok(UserService {
            repo: args.get()?,
            validators: args.collection()?,
            logger: args.get()?,
        })
    }
}

mawrid::implements!(
    ConsoleLogger => dyn Logger,
    PrefixedLogger => dyn Logger,
    NonZero => dyn Validator,
);

fn main() -> Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter("mawrid_container=debug")
        .init();

    let container = Container::new();

    container.register_instance(Arc::new(Config {
        database_url: "postgres://localhost/myapp".to_string(),
    }))?;
    container.register::<dyn Logger, ConsoleLogger>(Lifestyle::Singleton)?;
    container.register_decorator::<dyn Logger, PrefixedLogger>(Lifestyle::Singleton)?;
    container.register::<Database, Database>(Lifestyle::Singleton)?;
    // One per scope, e.g. per HTTP request
    container.register::<UserRepository, UserRepository>(Lifestyle::Scoped)?;
    container.register::<UserService, UserService>(Lifestyle::Transient)?;

    container.append_to_collection::<dyn Validator, NonZero>(Lifestyle::Singleton)?;
    container.append_factory_to_collection::<dyn Validator>(Lifestyle::Singleton, |_| {
        Ok(Arc::new(Below(1_000)) as Arc<dyn Validator>)
    })?;

    container.verify()?;
    println!("✅ Container verified!");
    println!("{container:?}");

    let report = container.analyze()?;
    println!("🩺 Diagnostics:\n{report}");

    // === Create a scope (e.g., for an HTTP request) ===
    {
        let _scope = container.begin_scope();

        let service = container.get_instance::<UserService>()?;
        println!("👤 {}", service.get_user(42)?);

        // Resolve again in same scope; UserRepository is reused
        let again = container.get_instance::<UserService>()?;
        assert!(Arc::ptr_eq(&service.repo, &again.repo));
        println!("👤 {}", again.get_user(0)?);
    }
    // scope dropped, all Scoped instances cleaned up

    container.dispose();
    println!("\n🎉 Everything works!");
    Ok(())
}
