//! # ferrous-context
//!
//! Bean container with an ordered refresh lifecycle, a post-processor
//! pipeline and auto-proxying AOP.
//!
//! ## Features
//!
//! - **Ordered refresh**: twelve phases from environment preparation to the
//!   refreshed event, with rollback of created singletons on failure
//! - **Post-processors**: registry and factory post-processors run to a
//!   fixpoint in priority, ordered and unordered groups; bean
//!   post-processors hook every stage of bean creation
//! - **Circular references**: singletons are exposed early through a
//!   three-level cache, and proxies created for early references are reused
//! - **AOP**: advisors and aspects are applied by an auto-proxy creator;
//!   proxies run an interceptor chain around every advised call
//! - **Events, lifecycle and messages**: listeners, phased start/stop and a
//!   message source are wired by the context
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_context::{ApplicationContext, BeanDefinition, BeanLookup, PropertyValue};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let context = ApplicationContext::builder()
//!     .definition(
//!         BeanDefinition::of::<Database, _>("database", |ctx| {
//!             Ok(Database { url: ctx.property_text("url")?.to_string() })
//!         })
//!         .property("url", PropertyValue::text("postgres://localhost")),
//!     )
//!     .definition(BeanDefinition::of::<UserService, _>("userService", |ctx| {
//!         Ok(UserService { db: ctx.get_bean_as::<Database>("database")? })
//!     }))
//!     .build();
//!
//! context.refresh().unwrap();
//! let users = context.get_bean_as::<UserService>("userService").unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! context.close();
//! ```
//!
//! ## Refresh phases
//!
//! See [`RefreshPhase`] for the sequence; observe it with a
//! [`ContextObserver`] such as [`LoggingObserver`] or [`MetricsObserver`].

pub mod aop;
pub mod config;
pub mod context;
pub mod definition;
pub mod error;
pub mod event;
pub mod factory;
pub mod lifecycle;
pub mod message;
pub mod observer;
pub mod order;
pub mod processor;
pub mod registry;
pub mod scope;

mod internal;

pub use config::{ContextSettings, ProxySettings};
pub use context::{
    ApplicationContext, ContextBuilder, ContextHooks, DefinitionSource, Environment, PropertySource, RefreshPhase,
    ENVIRONMENT_BEAN_NAME, LIFECYCLE_PROCESSOR_BEAN_NAME,
};
pub use definition::{AnyArc, BeanClass, BeanDefinition, Capability, PropertyValue, ProxyBinding};
pub use error::{DiError, DiResult};
pub use event::{
    ApplicationEvent, ApplicationEventMulticaster, ApplicationListener, EventKind, SimpleEventMulticaster,
    APPLICATION_EVENT_MULTICASTER_BEAN_NAME,
};
pub use factory::{BeanContext, BeanFactory, BeanLookup, BeanMeta, FactoryBean, ParentLookup};
pub use lifecycle::{DefaultLifecycleProcessor, Lifecycle};
pub use message::{MessageSource, StaticMessageSource, MESSAGE_SOURCE_BEAN_NAME};
pub use observer::{ContextObserver, LoggingObserver, MetricsObserver};
pub use order::{OrderMarker, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE};
pub use processor::{
    BeanDefinitionRegistryPostProcessor, BeanFactoryPostProcessor, BeanPostProcessor, FactoryProcessor, Hook,
    PropertyPlaceholderConfigurer,
};
pub use registry::BeanDefinitionRegistry;
pub use scope::{BeanRole, BeanScope};
