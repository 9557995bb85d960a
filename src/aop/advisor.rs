//! Advisors, aspects and the adapter registry turning advice into
//! interceptors.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::aop::advice::{
    Advice, AfterAdviceInterceptor, AfterReturningAdviceInterceptor, BeforeAdviceInterceptor, MethodInterceptor,
    ThrowsAdviceInterceptor,
};
use crate::aop::pointcut::{ExpressionPointcut, Pointcut, TruePointcut};
use crate::definition::{AnyArc, BeanClass};
use crate::error::{DiError, DiResult};
use crate::order::LOWEST_PRECEDENCE;

/// Pointcut plus advice.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::aop::{Advice, Advisor};
///
/// let advisor = Advisor::expression("execution(* calculate.*(..))", Advice::before(|jp| {
///     println!("calling {}", jp.signature());
///     Ok(())
/// }))
/// .unwrap()
/// .with_order(10);
///
/// assert_eq!(advisor.order(), 10);
/// assert_eq!(advisor.advice().kind(), "before");
/// ```
#[derive(Clone)]
pub struct Advisor {
    pointcut: Arc<dyn Pointcut>,
    advice: Advice,
    order: Option<i32>,
}

impl Advisor {
    pub fn new(pointcut: impl Pointcut + 'static, advice: Advice) -> Self {
        Self::with_pointcut(Arc::new(pointcut), advice)
    }

    pub fn with_pointcut(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Self {
            pointcut,
            advice,
            order: None,
        }
    }

    /// Advisor matching every method of every bean.
    pub fn for_all(advice: Advice) -> Self {
        Self::new(TruePointcut, advice)
    }

    /// Advisor with an `execution(..)` pointcut.
    pub fn expression(expression: &str, advice: Advice) -> DiResult<Self> {
        Ok(Self::new(ExpressionPointcut::parse(expression)?, advice))
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn pointcut(&self) -> &dyn Pointcut {
        self.pointcut.as_ref()
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    /// Lower runs first; defaults to the lowest precedence.
    pub fn order(&self) -> i32 {
        self.order.unwrap_or(LOWEST_PRECEDENCE)
    }

    pub(crate) fn default_order(&mut self, order: i32) {
        self.order.get_or_insert(order);
    }

    pub(crate) fn applies_to(&self, class: &BeanClass) -> bool {
        crate::aop::pointcut::can_apply(self.pointcut.as_ref(), class)
    }

    pub(crate) fn matches(&self, class: &BeanClass, method: &str) -> bool {
        self.pointcut.matches_class(class)
            && (self.pointcut.matches_every_method() || self.pointcut.matches_method(class, method))
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("pointcut", &self.pointcut)
            .field("advice", &self.advice)
            .field("order", &self.order())
            .finish()
    }
}

/// Bean contributing several advisors, such as a logging aspect with
/// before and after advice.
///
/// Advisors without an explicit order take the aspect's order.
pub trait Aspect: Send + Sync {
    fn advisors(&self) -> DiResult<Vec<Advisor>>;

    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }
}

/// Turns one kind of advice into an interceptor.
pub trait AdvisorAdapter: Send + Sync {
    fn supports(&self, advice: &Advice) -> bool;

    fn interceptor(&self, advice: &Advice) -> Option<Arc<dyn MethodInterceptor>>;
}

struct BeforeAdviceAdapter;

impl AdvisorAdapter for BeforeAdviceAdapter {
    fn supports(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Before(_))
    }

    fn interceptor(&self, advice: &Advice) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::Before(a) => Some(Arc::new(BeforeAdviceInterceptor(a.clone()))),
            _ => None,
        }
    }
}

struct AfterReturningAdviceAdapter;

impl AdvisorAdapter for AfterReturningAdviceAdapter {
    fn supports(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::AfterReturning(_))
    }

    fn interceptor(&self, advice: &Advice) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::AfterReturning(a) => Some(Arc::new(AfterReturningAdviceInterceptor(a.clone()))),
            _ => None,
        }
    }
}

struct ThrowsAdviceAdapter;

impl AdvisorAdapter for ThrowsAdviceAdapter {
    fn supports(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::AfterThrowing(_))
    }

    fn interceptor(&self, advice: &Advice) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::AfterThrowing(a) => Some(Arc::new(ThrowsAdviceInterceptor(a.clone()))),
            _ => None,
        }
    }
}

/// Registry of [`AdvisorAdapter`]s.
///
/// One instance is created per context and shared with every proxy it
/// builds. Around and after advice are interceptors already; the default
/// adapters handle before, after-returning and after-throwing advice.
pub struct AdvisorAdapterRegistry {
    adapters: RwLock<Vec<Arc<dyn AdvisorAdapter>>>,
}

impl Default for AdvisorAdapterRegistry {
    fn default() -> Self {
        Self {
            adapters: RwLock::new(vec![
                Arc::new(BeforeAdviceAdapter),
                Arc::new(AfterReturningAdviceAdapter),
                Arc::new(ThrowsAdviceAdapter),
            ]),
        }
    }
}

impl AdvisorAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_adapter(&self, adapter: Arc<dyn AdvisorAdapter>) {
        self.adapters.write().push(adapter);
    }

    /// Interceptors for one advisor's advice.
    pub fn interceptors(&self, advisor: &Advisor) -> DiResult<Vec<Arc<dyn MethodInterceptor>>> {
        let advice = advisor.advice();
        let mut interceptors: Vec<Arc<dyn MethodInterceptor>> = Vec::with_capacity(1);
        match advice {
            Advice::Around(interceptor) => interceptors.push(interceptor.clone()),
            Advice::After(after) => interceptors.push(Arc::new(AfterAdviceInterceptor(after.clone()))),
            _ => {}
        }
        for adapter in self.adapters.read().iter() {
            if adapter.supports(advice) {
                interceptors.extend(adapter.interceptor(advice));
            }
        }
        if interceptors.is_empty() {
            return Err(DiError::Configuration(format!(
                "Advice object [{}] is neither a supported advice kind nor a method interceptor",
                advice.kind()
            )));
        }
        Ok(interceptors)
    }

    /// Wraps a bean named as a common interceptor: advisors pass through,
    /// advice applies to every method.
    pub fn wrap(&self, name: &str, bean: &AnyArc) -> DiResult<Advisor> {
        if let Some(advisor) = bean.downcast_ref::<Advisor>() {
            return Ok(advisor.clone());
        }
        if let Some(advice) = bean.downcast_ref::<Advice>() {
            return Ok(Advisor::for_all(advice.clone()));
        }
        if let Some(interceptor) = bean.downcast_ref::<Arc<dyn MethodInterceptor>>() {
            return Ok(Advisor::for_all(Advice::Around(interceptor.clone())));
        }
        Err(DiError::Configuration(format!(
            "Bean '{name}' is neither an advisor nor advice"
        )))
    }
}

impl fmt::Debug for AdvisorAdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisorAdapterRegistry")
            .field("adapters", &self.adapters.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Audit;

    #[test]
    fn every_builtin_kind_becomes_one_interceptor() {
        let registry = AdvisorAdapterRegistry::new();
        let kinds = [
            Advice::before(|_| Ok(())),
            Advice::after(|_| Ok(())),
            Advice::after_returning(|_, _| Ok(())),
            Advice::after_throwing(|_, _| Ok(())),
            Advice::around(|inv| inv.proceed()),
        ];
        for advice in kinds {
            let advisor = Advisor::for_all(advice);
            assert_eq!(registry.interceptors(&advisor).unwrap().len(), 1);
        }
    }

    #[test]
    fn custom_advice_needs_an_adapter() {
        struct AuditAdapter;
        impl AdvisorAdapter for AuditAdapter {
            fn supports(&self, advice: &Advice) -> bool {
                matches!(advice, Advice::Custom(a) if a.is::<Audit>())
            }
            fn interceptor(&self, _: &Advice) -> Option<Arc<dyn MethodInterceptor>> {
                match Advice::around(|inv| inv.proceed()) {
                    Advice::Around(i) => Some(i),
                    _ => None,
                }
            }
        }

        let registry = AdvisorAdapterRegistry::new();
        let advisor = Advisor::for_all(Advice::Custom(Arc::new(Audit)));
        assert!(matches!(registry.interceptors(&advisor), Err(DiError::Configuration(_))));

        registry.register_adapter(Arc::new(AuditAdapter));
        assert_eq!(registry.interceptors(&advisor).unwrap().len(), 1);
    }

    #[test]
    fn wrap_accepts_advisors_and_advice_only() {
        let registry = AdvisorAdapterRegistry::new();
        let advice: AnyArc = Arc::new(Advice::before(|_| Ok(())));
        assert_eq!(registry.wrap("a", &advice).unwrap().order(), LOWEST_PRECEDENCE);

        let advisor: AnyArc = Arc::new(Advisor::for_all(Advice::after(|_| Ok(()))).with_order(3));
        assert_eq!(registry.wrap("b", &advisor).unwrap().order(), 3);

        let other: AnyArc = Arc::new(5u8);
        assert!(registry.wrap("c", &other).is_err());
    }
}
