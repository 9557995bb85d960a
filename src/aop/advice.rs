//! Advice kinds, join points and the interceptor chain.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{DiError, DiResult};

/// Type-erased return value flowing through an interceptor chain.
pub type Outcome = Box<dyn Any + Send>;

/// The advised call being executed.
#[derive(Debug, Clone)]
pub struct JoinPoint {
    bean_name: String,
    target_type: &'static str,
    method: &'static str,
    args: Vec<String>,
    started: Instant,
}

impl JoinPoint {
    pub(crate) fn new(bean_name: &str, target_type: &'static str, method: &'static str, args: &[&dyn fmt::Debug]) -> Self {
        Self {
            bean_name: bean_name.to_string(),
            target_type,
            method,
            args: args.iter().map(|a| format!("{a:?}")).collect(),
            started: Instant::now(),
        }
    }

    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }

    pub fn target_type(&self) -> &'static str {
        self.target_type
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Arguments rendered with `Debug`.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// `Type.method`, with the simple type name.
    pub fn signature(&self) -> String {
        format!("{}.{}", crate::definition::simple_name(self.target_type), self.method)
    }

    /// Time since the proxy received the call.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}

/// Runs before the target method; an error aborts the call.
pub trait MethodBeforeAdvice: Send + Sync {
    fn before(&self, join_point: &JoinPoint) -> DiResult<()>;
}

/// Runs after the target method whether it succeeded or failed.
pub trait AfterAdvice: Send + Sync {
    fn after(&self, join_point: &JoinPoint) -> DiResult<()>;
}

/// Runs after the target method returned normally.
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(&self, join_point: &JoinPoint, value: &(dyn Any + Send)) -> DiResult<()>;
}

/// Runs after the target method failed; the original error is rethrown
/// unless the advice itself fails.
pub trait ThrowsAdvice: Send + Sync {
    fn after_throwing(&self, join_point: &JoinPoint, error: &DiError) -> DiResult<()>;
}

/// Around advice with full control over the call.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::aop::{MethodInterceptor, MethodInvocation, Outcome};
/// use ferrous_context::DiResult;
///
/// struct Timing;
///
/// impl MethodInterceptor for Timing {
///     fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> DiResult<Outcome> {
///         let result = invocation.proceed();
///         println!("{} took {:?}", invocation.join_point().signature(), invocation.join_point().elapsed());
///         result
///     }
/// }
/// ```
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> DiResult<Outcome>;
}

impl<F> MethodBeforeAdvice for F
where
    F: Fn(&JoinPoint) -> DiResult<()> + Send + Sync,
{
    fn before(&self, join_point: &JoinPoint) -> DiResult<()> {
        self(join_point)
    }
}

impl<F> AfterReturningAdvice for F
where
    F: Fn(&JoinPoint, &(dyn Any + Send)) -> DiResult<()> + Send + Sync,
{
    fn after_returning(&self, join_point: &JoinPoint, value: &(dyn Any + Send)) -> DiResult<()> {
        self(join_point, value)
    }
}

impl<F> ThrowsAdvice for F
where
    F: Fn(&JoinPoint, &DiError) -> DiResult<()> + Send + Sync,
{
    fn after_throwing(&self, join_point: &JoinPoint, error: &DiError) -> DiResult<()> {
        self(join_point, error)
    }
}

impl<F> MethodInterceptor for F
where
    F: for<'a> Fn(&mut MethodInvocation<'a>) -> DiResult<Outcome> + Send + Sync,
{
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> DiResult<Outcome> {
        self(invocation)
    }
}

struct FnAfter<F>(F);

impl<F> AfterAdvice for FnAfter<F>
where
    F: Fn(&JoinPoint) -> DiResult<()> + Send + Sync,
{
    fn after(&self, join_point: &JoinPoint) -> DiResult<()> {
        (self.0)(join_point)
    }
}

/// A piece of advice.
///
/// `Custom` advice is only usable when an [`AdvisorAdapter`] registered on
/// the adapter registry supports it.
///
/// [`AdvisorAdapter`]: crate::aop::AdvisorAdapter
#[derive(Clone)]
pub enum Advice {
    Before(Arc<dyn MethodBeforeAdvice>),
    After(Arc<dyn AfterAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn ThrowsAdvice>),
    Around(Arc<dyn MethodInterceptor>),
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Advice {
    pub fn before<F>(advice: F) -> Self
    where
        F: Fn(&JoinPoint) -> DiResult<()> + Send + Sync + 'static,
    {
        Advice::Before(Arc::new(advice))
    }

    pub fn after<F>(advice: F) -> Self
    where
        F: Fn(&JoinPoint) -> DiResult<()> + Send + Sync + 'static,
    {
        Advice::After(Arc::new(FnAfter(advice)))
    }

    pub fn after_returning<F>(advice: F) -> Self
    where
        F: Fn(&JoinPoint, &(dyn Any + Send)) -> DiResult<()> + Send + Sync + 'static,
    {
        Advice::AfterReturning(Arc::new(advice))
    }

    pub fn after_throwing<F>(advice: F) -> Self
    where
        F: Fn(&JoinPoint, &DiError) -> DiResult<()> + Send + Sync + 'static,
    {
        Advice::AfterThrowing(Arc::new(advice))
    }

    pub fn around<F>(advice: F) -> Self
    where
        F: for<'a> Fn(&mut MethodInvocation<'a>) -> DiResult<Outcome> + Send + Sync + 'static,
    {
        Advice::Around(Arc::new(advice))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Advice::Before(_) => "before",
            Advice::After(_) => "after",
            Advice::AfterReturning(_) => "after-returning",
            Advice::AfterThrowing(_) => "after-throwing",
            Advice::Around(_) => "around",
            Advice::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Advice").field(&self.kind()).finish()
    }
}

/// One call travelling down an interceptor chain.
///
/// Each interceptor calls [`proceed`](Self::proceed) to hand control to the
/// next one; the last `proceed` invokes the target method.
pub struct MethodInvocation<'a> {
    join_point: &'a JoinPoint,
    interceptors: &'a [Arc<dyn MethodInterceptor>],
    index: usize,
    target: &'a mut (dyn FnMut() -> DiResult<Outcome> + 'a),
}

impl<'a> MethodInvocation<'a> {
    pub(crate) fn new(
        join_point: &'a JoinPoint,
        interceptors: &'a [Arc<dyn MethodInterceptor>],
        target: &'a mut (dyn FnMut() -> DiResult<Outcome> + 'a),
    ) -> Self {
        Self {
            join_point,
            interceptors,
            index: 0,
            target,
        }
    }

    pub fn join_point(&self) -> &JoinPoint {
        self.join_point
    }

    /// Runs the rest of the chain. May be called more than once, e.g. by
    /// retrying advice.
    pub fn proceed(&mut self) -> DiResult<Outcome> {
        let Some(interceptor) = self.interceptors.get(self.index).cloned() else {
            return (self.target)();
        };
        let saved = self.index;
        self.index += 1;
        let result = interceptor.invoke(self);
        self.index = saved;
        result
    }
}

pub(crate) struct BeforeAdviceInterceptor(pub(crate) Arc<dyn MethodBeforeAdvice>);

impl MethodInterceptor for BeforeAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> DiResult<Outcome> {
        self.0.before(invocation.join_point())?;
        invocation.proceed()
    }
}

pub(crate) struct AfterAdviceInterceptor(pub(crate) Arc<dyn AfterAdvice>);

impl MethodInterceptor for AfterAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> DiResult<Outcome> {
        let result = invocation.proceed();
        self.0.after(invocation.join_point())?;
        result
    }
}

pub(crate) struct AfterReturningAdviceInterceptor(pub(crate) Arc<dyn AfterReturningAdvice>);

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> DiResult<Outcome> {
        let value = invocation.proceed()?;
        self.0.after_returning(invocation.join_point(), value.as_ref())?;
        Ok(value)
    }
}

pub(crate) struct ThrowsAdviceInterceptor(pub(crate) Arc<dyn ThrowsAdvice>);

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> DiResult<Outcome> {
        match invocation.proceed() {
            Err(error) => {
                self.0.after_throwing(invocation.join_point(), &error)?;
                Err(error)
            }
            ok => ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn run(chain: &[Arc<dyn MethodInterceptor>], target: impl Fn() -> DiResult<i32>) -> DiResult<i32> {
        let jp = JoinPoint::new("calc", "demo::Calc", "add", &[&1, &2]);
        let mut call = || target().map(|v| Box::new(v) as Outcome);
        let out = MethodInvocation::new(&jp, chain, &mut call).proceed()?;
        Ok(*out.downcast::<i32>().unwrap())
    }

    #[test]
    fn chain_runs_in_order_around_target() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (log.clone(), log.clone(), log.clone());
        let chain: Vec<Arc<dyn MethodInterceptor>> = vec![
            Arc::new(BeforeAdviceInterceptor(Arc::new(move |jp: &JoinPoint| {
                a.lock().push(format!("before {}", jp.signature()));
                Ok(())
            }))),
            Arc::new(AfterAdviceInterceptor(Arc::new(FnAfter(move |_: &JoinPoint| {
                b.lock().push("after".to_string());
                Ok(())
            })))),
            Arc::new(AfterReturningAdviceInterceptor(Arc::new(
                move |_: &JoinPoint, value: &(dyn Any + Send)| {
                    c.lock().push(format!("returned {}", value.downcast_ref::<i32>().unwrap()));
                    Ok(())
                },
            ))),
        ];

        assert_eq!(run(&chain, || Ok(3)).unwrap(), 3);
        assert_eq!(*log.lock(), vec!["before Calc.add", "returned 3", "after"]);
    }

    #[test]
    fn throws_advice_sees_error_and_rethrows() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let chain: Vec<Arc<dyn MethodInterceptor>> = vec![Arc::new(ThrowsAdviceInterceptor(Arc::new(
            move |_: &JoinPoint, error: &DiError| {
                *sink.lock() = Some(error.to_string());
                Ok(())
            },
        )))];

        let result = run(&chain, || Err(DiError::invocation("div", "division by zero")));
        assert!(matches!(result, Err(DiError::Invocation { .. })));
        assert!(seen.lock().as_deref().unwrap().contains("division by zero"));
    }

    #[test]
    fn around_advice_can_proceed_twice() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let Advice::Around(retry) = Advice::around(|inv| {
            let _ = inv.proceed()?;
            inv.proceed()
        }) else {
            unreachable!()
        };
        let result = run(&[retry], move || {
            *counter.lock() += 1;
            Ok(7)
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(*calls.lock(), 2);
    }
}
