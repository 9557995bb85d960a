//! Bean definitions: the recipe the factory follows to build a bean.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::aop::{Advisor, Aspect, ProxyHandle};
use crate::error::{DiError, DiResult};
use crate::event::{ApplicationEventMulticaster, ApplicationListener};
use crate::factory::{BeanContext, FactoryBean};
use crate::lifecycle::Lifecycle;
use crate::message::MessageSource;
use crate::order::OrderMarker;
use crate::processor::{BeanDefinitionRegistryPostProcessor, BeanFactoryPostProcessor, BeanPostProcessor};
use crate::scope::{BeanRole, BeanScope};

/// Type-erased bean instance.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type Ctor = Arc<dyn for<'a> Fn(&BeanContext<'a>) -> DiResult<AnyArc> + Send + Sync>;
pub(crate) type PopulateFn = Arc<dyn for<'a> Fn(&AnyArc, &BeanContext<'a>) -> DiResult<()> + Send + Sync>;
pub(crate) type CallbackFn = Arc<dyn Fn(&AnyArc) -> DiResult<()> + Send + Sync>;
type ProxyBuildFn = Arc<dyn Fn(ProxyHandle) -> AnyArc + Send + Sync>;

fn make_ctor<F>(f: F) -> Ctor
where
    F: for<'a> Fn(&BeanContext<'a>) -> DiResult<AnyArc> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn make_populate<F>(f: F) -> PopulateFn
where
    F: for<'a> Fn(&AnyArc, &BeanContext<'a>) -> DiResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Capability tag fixing how a bean is stored and which container hooks
/// apply to it.
///
/// The tag replaces runtime interface checks: it is chosen by the
/// [`BeanDefinition`] constructor and determines the stored form of the
/// instance (e.g. `Arc<dyn BeanPostProcessor>` for `BeanPostProcessor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Plain application bean
    Bean,
    /// `Arc<dyn BeanDefinitionRegistryPostProcessor>`
    RegistryPostProcessor,
    /// `Arc<dyn BeanFactoryPostProcessor>`
    FactoryPostProcessor,
    /// `Arc<dyn BeanPostProcessor>`
    BeanPostProcessor,
    /// `Advisor`
    Advisor,
    /// `Arc<dyn Aspect>`
    Aspect,
    /// `Arc<dyn ApplicationListener>`
    Listener,
    /// `Arc<dyn Lifecycle>`
    Lifecycle,
    /// `Arc<dyn MessageSource>`
    MessageSource,
    /// `Arc<dyn ApplicationEventMulticaster>`
    EventMulticaster,
    /// `Arc<dyn FactoryBean>`; lookups by name return its product
    FactoryBean,
}

impl Capability {
    /// Registry post-processors are also factory post-processors.
    pub fn satisfies(self, wanted: Capability) -> bool {
        self == wanted
            || (self == Capability::RegistryPostProcessor && wanted == Capability::FactoryPostProcessor)
    }
}

/// Value of a constructor argument or property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Literal text; `${..}` placeholders are resolved by the placeholder
    /// configurer
    Text(String),
    /// Reference to another bean by name
    Ref(String),
}

impl PropertyValue {
    pub fn text(value: impl Into<String>) -> Self {
        PropertyValue::Text(value.into())
    }

    pub fn reference(bean: impl Into<String>) -> Self {
        PropertyValue::Ref(bean.into())
    }
}

/// Converts a raw target into the stored form an interface proxy expects.
pub(crate) type TargetView = Arc<dyn Fn(AnyArc) -> Option<AnyArc> + Send + Sync>;

/// Factory for a proxy object around a [`ProxyHandle`].
///
/// Interface bindings produce `Arc<dyn I>` wrappers stored like trait
/// beans; class bindings produce a new instance of the concrete type that
/// delegates through the handle.
#[derive(Clone)]
pub struct ProxyBinding {
    name: &'static str,
    build: ProxyBuildFn,
    view: Option<TargetView>,
}

impl ProxyBinding {
    /// Binding for trait-object beans stored as `Arc<I>`.
    pub fn interface<I, F>(name: &'static str, build: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(ProxyHandle) -> Arc<I> + Send + Sync + 'static,
    {
        Self {
            name,
            build: interface_builder::<I, F>(build),
            view: None,
        }
    }

    /// Binding for a concrete bean `T` exposed through interface `I`.
    ///
    /// `cast` is usually `|t| t as Arc<dyn I>`.
    pub fn implemented_by<T, I, C, F>(name: &'static str, cast: C, build: F) -> Self
    where
        T: Send + Sync + 'static,
        I: ?Sized + Send + Sync + 'static,
        C: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
        F: Fn(ProxyHandle) -> Arc<I> + Send + Sync + 'static,
    {
        let view: TargetView = Arc::new(move |raw: AnyArc| {
            raw.downcast::<T>().ok().map(|t| Arc::new(cast(t)) as AnyArc)
        });
        Self {
            name,
            build: interface_builder::<I, F>(build),
            view: Some(view),
        }
    }

    /// Binding for concrete-type beans.
    pub fn class<T, F>(build: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(ProxyHandle) -> T + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<T>(),
            build: Arc::new(move |handle: ProxyHandle| {
                let proxy = Arc::new(build(handle.clone()));
                handle.bind_self(Arc::downgrade(&proxy));
                proxy as AnyArc
            }),
            view: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn build(&self, handle: ProxyHandle) -> AnyArc {
        (self.build)(handle)
    }

    pub(crate) fn view(&self) -> Option<TargetView> {
        self.view.clone()
    }
}

fn interface_builder<I, F>(build: F) -> ProxyBuildFn
where
    I: ?Sized + Send + Sync + 'static,
    F: Fn(ProxyHandle) -> Arc<I> + Send + Sync + 'static,
{
    Arc::new(move |handle: ProxyHandle| {
        let proxy = build(handle.clone());
        handle.bind_self(Arc::downgrade(&proxy));
        Arc::new(proxy) as AnyArc
    })
}

impl fmt::Debug for ProxyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyBinding").field("name", &self.name).finish()
    }
}

#[derive(Clone)]
struct ClassInner {
    type_id: TypeId,
    type_name: &'static str,
    methods: Vec<&'static str>,
    interfaces: Vec<ProxyBinding>,
    class_proxy: Option<ProxyBinding>,
    aop_infrastructure: bool,
    trait_object: bool,
}

/// Class metadata for a bean: what pointcuts match against and how the
/// bean can be proxied.
#[derive(Clone)]
pub struct BeanClass {
    inner: Arc<ClassInner>,
}

impl BeanClass {
    /// Metadata for a bean stored as `T`.
    pub fn of<T: Any>() -> Self {
        Self::with_ids(TypeId::of::<T>(), std::any::type_name::<T>(), false)
    }

    /// Metadata for a bean stored as `Arc<I>`.
    pub fn of_trait<I: ?Sized + 'static>() -> Self {
        Self::with_ids(TypeId::of::<Arc<I>>(), std::any::type_name::<I>(), true)
    }

    fn with_ids(type_id: TypeId, type_name: &'static str, trait_object: bool) -> Self {
        Self {
            inner: Arc::new(ClassInner {
                type_id,
                type_name,
                methods: Vec::new(),
                interfaces: Vec::new(),
                class_proxy: None,
                aop_infrastructure: false,
                trait_object,
            }),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.inner.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }

    /// Last path segment of the type name, generics stripped.
    pub fn simple_name(&self) -> &'static str {
        simple_name(self.inner.type_name)
    }

    pub fn methods(&self) -> &[&'static str] {
        &self.inner.methods
    }

    pub fn interfaces(&self) -> &[ProxyBinding] {
        &self.inner.interfaces
    }

    pub fn class_proxy(&self) -> Option<&ProxyBinding> {
        self.inner.class_proxy.as_ref()
    }

    /// Advice, advisor, aspect and pointcut classes are never proxied.
    pub fn is_aop_infrastructure(&self) -> bool {
        self.inner.aop_infrastructure
    }

    /// True when the bean is stored as `Arc<dyn Trait>`.
    pub fn is_trait_object(&self) -> bool {
        self.inner.trait_object
    }

    /// Whether `method` is among the declared method names.
    pub fn declares(&self, method: &str) -> bool {
        self.inner.methods.iter().any(|m| *m == method)
    }

    pub(crate) fn set_methods(&mut self, methods: &[&'static str]) {
        Arc::make_mut(&mut self.inner).methods = methods.to_vec();
    }

    pub(crate) fn add_interface(&mut self, binding: ProxyBinding) {
        Arc::make_mut(&mut self.inner).interfaces.push(binding);
    }

    pub(crate) fn set_class_proxy(&mut self, binding: ProxyBinding) {
        Arc::make_mut(&mut self.inner).class_proxy = Some(binding);
    }

    pub(crate) fn mark_aop_infrastructure(&mut self) {
        Arc::make_mut(&mut self.inner).aop_infrastructure = true;
    }
}

impl fmt::Debug for BeanClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanClass")
            .field("type_name", &self.inner.type_name)
            .field("methods", &self.inner.methods)
            .field("interfaces", &self.inner.interfaces)
            .finish()
    }
}

pub(crate) fn simple_name(type_name: &'static str) -> &'static str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let base = base.trim_start_matches("dyn ");
    base.rsplit("::").next().unwrap_or(base)
}

/// Recipe for one bean.
///
/// Definitions are owned by the registry and stay mutable until the
/// factory configuration is frozen at the end of refresh. Factory
/// post-processors can rewrite them before any application bean exists.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{ApplicationContext, BeanDefinition, BeanLookup, PropertyValue};
///
/// struct Database { url: String }
/// struct Repository { db_url: String }
///
/// let context = ApplicationContext::builder()
///     .definition(
///         BeanDefinition::of::<Database, _>("database", |ctx| {
///             Ok(Database { url: ctx.property_text("url")?.to_string() })
///         })
///         .property("url", PropertyValue::text("postgres://localhost")),
///     )
///     .definition(BeanDefinition::of::<Repository, _>("repository", |ctx| {
///         let db = ctx.get_bean_as::<Database>("database")?;
///         Ok(Repository { db_url: db.url.clone() })
///     }))
///     .build();
/// context.refresh().unwrap();
///
/// let repo = context.get_bean_as::<Repository>("repository").unwrap();
/// assert_eq!(repo.db_url, "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct BeanDefinition {
    pub(crate) name: String,
    pub(crate) class: BeanClass,
    pub(crate) capability: Capability,
    pub(crate) scope: BeanScope,
    pub(crate) lazy: bool,
    pub(crate) role: BeanRole,
    pub(crate) order: OrderMarker,
    pub(crate) constructor_args: Vec<PropertyValue>,
    pub(crate) property_values: Vec<(String, PropertyValue)>,
    pub(crate) depends_on: Vec<String>,
    pub(crate) preserve_target_class: bool,
    pub(crate) ctor: Ctor,
    pub(crate) populate: Option<PopulateFn>,
    pub(crate) init: Option<CallbackFn>,
    pub(crate) destroy: Option<CallbackFn>,
}

impl BeanDefinition {
    fn raw(name: impl Into<String>, class: BeanClass, capability: Capability, ctor: Ctor) -> Self {
        Self {
            name: name.into(),
            class,
            capability,
            scope: BeanScope::Singleton,
            lazy: false,
            role: BeanRole::Application,
            order: OrderMarker::Unordered,
            constructor_args: Vec::new(),
            property_values: Vec::new(),
            depends_on: Vec::new(),
            preserve_target_class: false,
            ctor,
            populate: None,
            init: None,
            destroy: None,
        }
    }

    /// Bean stored as the concrete type `T`.
    pub fn of<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<T> + Send + Sync + 'static,
    {
        let ctor = make_ctor(move |ctx| Ok(Arc::new(factory(ctx)?) as AnyArc));
        Self::raw(name, BeanClass::of::<T>(), Capability::Bean, ctor)
    }

    /// Bean stored as `Arc<I>`; the form interface proxies wrap.
    pub fn trait_object<I, F>(name: impl Into<String>, factory: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Arc<I>> + Send + Sync + 'static,
    {
        Self::tagged::<I, F>(name, Capability::Bean, factory)
    }

    fn tagged<I, F>(name: impl Into<String>, capability: Capability, factory: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Arc<I>> + Send + Sync + 'static,
    {
        let ctor = make_ctor(move |ctx| Ok(Arc::new(factory(ctx)?) as AnyArc));
        Self::raw(name, BeanClass::of_trait::<I>(), capability, ctor)
    }

    pub fn registry_post_processor<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Arc<dyn BeanDefinitionRegistryPostProcessor>> + Send + Sync + 'static,
    {
        Self::tagged(name, Capability::RegistryPostProcessor, factory)
    }

    pub fn factory_post_processor<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Arc<dyn BeanFactoryPostProcessor>> + Send + Sync + 'static,
    {
        Self::tagged(name, Capability::FactoryPostProcessor, factory)
    }

    pub fn bean_post_processor<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Arc<dyn BeanPostProcessor>> + Send + Sync + 'static,
    {
        Self::tagged(name, Capability::BeanPostProcessor, factory)
    }

    /// Advisor bean; never itself proxied.
    pub fn advisor<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Advisor> + Send + Sync + 'static,
    {
        let mut def = Self::of::<Advisor, F>(name, factory);
        def.capability = Capability::Advisor;
        def.class.mark_aop_infrastructure();
        def
    }

    /// Aspect bean contributing several advisors; never itself proxied.
    pub fn aspect<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Arc<dyn Aspect>> + Send + Sync + 'static,
    {
        let mut def = Self::tagged(name, Capability::Aspect, factory);
        def.class.mark_aop_infrastructure();
        def
    }

    pub fn listener<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Arc<dyn ApplicationListener>> + Send + Sync + 'static,
    {
        Self::tagged(name, Capability::Listener, factory)
    }

    pub fn lifecycle<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Arc<dyn Lifecycle>> + Send + Sync + 'static,
    {
        Self::tagged(name, Capability::Lifecycle, factory)
    }

    pub fn message_source<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Arc<dyn MessageSource>> + Send + Sync + 'static,
    {
        Self::tagged(name, Capability::MessageSource, factory)
    }

    pub fn event_multicaster<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Arc<dyn ApplicationEventMulticaster>> + Send + Sync + 'static,
    {
        Self::tagged(name, Capability::EventMulticaster, factory)
    }

    /// Factory bean: `name` resolves to its product, `&name` to the factory.
    pub fn factory_bean<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: for<'a> Fn(&BeanContext<'a>) -> DiResult<Arc<dyn FactoryBean>> + Send + Sync + 'static,
    {
        Self::tagged(name, Capability::FactoryBean, factory)
    }

    // ----- Builder-style attributes -----

    pub fn scope(mut self, scope: BeanScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn role(mut self, role: BeanRole) -> Self {
        self.role = role;
        self
    }

    pub fn order(mut self, order: OrderMarker) -> Self {
        self.order = order;
        self
    }

    pub fn depends_on(mut self, bean: impl Into<String>) -> Self {
        self.depends_on.push(bean.into());
        self
    }

    pub fn arg(mut self, value: PropertyValue) -> Self {
        self.constructor_args.push(value);
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        let name = name.into();
        match self.property_values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.property_values.push((name, value)),
        }
        self
    }

    /// Declared method names pointcuts match against.
    pub fn methods(mut self, methods: &[&'static str]) -> Self {
        self.class.set_methods(methods);
        self
    }

    /// Interface proxy for a trait-object bean stored as `Arc<I>`.
    pub fn interface_proxy<I, F>(mut self, name: &'static str, build: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(ProxyHandle) -> Arc<I> + Send + Sync + 'static,
    {
        self.class.add_interface(ProxyBinding::interface::<I, F>(name, build));
        self
    }

    /// Interface proxy for a concrete bean stored as `T` that implements `I`.
    pub fn implements<T, I, C, F>(mut self, name: &'static str, cast: C, build: F) -> Self
    where
        T: Send + Sync + 'static,
        I: ?Sized + Send + Sync + 'static,
        C: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
        F: Fn(ProxyHandle) -> Arc<I> + Send + Sync + 'static,
    {
        self.class.add_interface(ProxyBinding::implemented_by::<T, I, C, F>(name, cast, build));
        self
    }

    /// Class proxy for a concrete bean stored as `T`.
    pub fn class_proxy<T, F>(mut self, build: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(ProxyHandle) -> T + Send + Sync + 'static,
    {
        self.class.set_class_proxy(ProxyBinding::class::<T, F>(build));
        self
    }

    /// Marks the class as AOP infrastructure so it is never proxied.
    pub fn aop_infrastructure(mut self) -> Self {
        self.class.mark_aop_infrastructure();
        self
    }

    /// Forces class-based proxying for this bean.
    pub fn preserve_target_class(mut self, preserve: bool) -> Self {
        self.preserve_target_class = preserve;
        self
    }

    /// Setter-injection step run after construction, before initialization.
    ///
    /// `S` is the stored form: `T` for [`BeanDefinition::of`] and `Arc<I>`
    /// for trait-object beans. Circular references between beans are only
    /// resolvable through this step.
    pub fn populate<S, F>(mut self, populate: F) -> Self
    where
        S: Send + Sync + 'static,
        F: for<'a> Fn(&S, &BeanContext<'a>) -> DiResult<()> + Send + Sync + 'static,
    {
        let name = self.name.clone();
        self.populate = Some(make_populate(move |bean, ctx| {
            let typed = downcast_stored::<S>(&name, bean)?;
            populate(typed, ctx)
        }));
        self
    }

    pub fn init<S, F>(mut self, init: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(&S) -> DiResult<()> + Send + Sync + 'static,
    {
        self.init = Some(typed_callback::<S, F>(self.name.clone(), init));
        self
    }

    pub fn destroy<S, F>(mut self, destroy: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(&S) -> DiResult<()> + Send + Sync + 'static,
    {
        self.destroy = Some(typed_callback::<S, F>(self.name.clone(), destroy));
        self
    }

    // ----- Accessors -----

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &BeanClass {
        &self.class
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn bean_scope(&self) -> BeanScope {
        self.scope
    }

    pub fn is_singleton(&self) -> bool {
        self.scope == BeanScope::Singleton
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn bean_role(&self) -> BeanRole {
        self.role
    }

    pub fn order_marker(&self) -> OrderMarker {
        self.order
    }

    pub fn constructor_args(&self) -> &[PropertyValue] {
        &self.constructor_args
    }

    pub fn property_values(&self) -> &[(String, PropertyValue)] {
        &self.property_values
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn is_preserve_target_class(&self) -> bool {
        self.preserve_target_class
    }

    pub fn has_destroy_callback(&self) -> bool {
        self.destroy.is_some()
    }

    // ----- Mutation for factory post-processors -----

    pub fn set_scope(&mut self, scope: BeanScope) {
        self.scope = scope;
    }

    pub fn set_lazy(&mut self, lazy: bool) {
        self.lazy = lazy;
    }

    pub fn set_role(&mut self, role: BeanRole) {
        self.role = role;
    }

    pub fn constructor_args_mut(&mut self) -> &mut Vec<PropertyValue> {
        &mut self.constructor_args
    }

    pub fn property_values_mut(&mut self) -> &mut Vec<(String, PropertyValue)> {
        &mut self.property_values
    }

    /// Copy of this definition registered under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.name = name.into();
        copy
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("class", &self.class.type_name())
            .field("capability", &self.capability)
            .field("scope", &self.scope)
            .field("lazy", &self.lazy)
            .field("role", &self.role)
            .field("order", &self.order)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

fn typed_callback<S, F>(name: String, callback: F) -> CallbackFn
where
    S: Send + Sync + 'static,
    F: Fn(&S) -> DiResult<()> + Send + Sync + 'static,
{
    Arc::new(move |bean: &AnyArc| callback(downcast_stored::<S>(&name, bean)?))
}

pub(crate) fn downcast_stored<'b, S: 'static>(name: &str, bean: &'b AnyArc) -> DiResult<&'b S> {
    bean.downcast_ref::<S>().ok_or_else(|| DiError::TypeMismatch {
        bean: name.to_string(),
        expected: std::any::type_name::<S>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    #[test]
    fn simple_name_strips_paths_and_generics() {
        assert_eq!(simple_name("demo::calc::LybqCalculate"), "LybqCalculate");
        assert_eq!(simple_name("dyn demo::Calculate"), "Calculate");
        assert_eq!(simple_name("alloc::vec::Vec<u8>"), "Vec");
    }

    #[test]
    fn constructors_pick_capability_and_class() {
        let plain = BeanDefinition::of::<u32, _>("n", |_| Ok(1));
        assert_eq!(plain.capability(), Capability::Bean);
        assert_eq!(plain.class().type_id(), TypeId::of::<u32>());

        let greeter = BeanDefinition::trait_object::<dyn Greeter, _>("g", |_| unreachable!());
        assert_eq!(greeter.class().type_id(), TypeId::of::<Arc<dyn Greeter>>());
        assert_eq!(greeter.class().simple_name(), "Greeter");

        let advisor = BeanDefinition::advisor("adv", |_| unreachable!());
        assert_eq!(advisor.capability(), Capability::Advisor);
        assert!(advisor.class().is_aop_infrastructure());
    }

    #[test]
    fn registry_processors_satisfy_factory_capability() {
        assert!(Capability::RegistryPostProcessor.satisfies(Capability::FactoryPostProcessor));
        assert!(!Capability::FactoryPostProcessor.satisfies(Capability::RegistryPostProcessor));
    }

    #[test]
    fn property_replaces_existing_value() {
        let def = BeanDefinition::of::<u32, _>("n", |_| Ok(1))
            .property("a", PropertyValue::text("1"))
            .property("a", PropertyValue::text("2"));
        assert_eq!(def.property_values(), &[("a".to_string(), PropertyValue::text("2"))]);
    }

    #[test]
    fn typed_callback_reports_type_mismatch() {
        let def = BeanDefinition::of::<u32, _>("n", |_| Ok(1)).init::<String, _>(|_| Ok(()));
        let bean: AnyArc = Arc::new(5u32);
        let err = (def.init.unwrap())(&bean).unwrap_err();
        assert!(matches!(err, DiError::TypeMismatch { .. }));
    }
}
