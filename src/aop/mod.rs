//! Aspect-oriented programming support.
//!
//! [`Advice`] says what runs around a method call, a [`Pointcut`] says
//! where, and an [`Advisor`] pairs the two. The [`AutoProxyCreator`]
//! post-processor wraps every bean some advisor applies to in a proxy
//! built from the bean's [`ProxyBinding`](crate::ProxyBinding); the
//! proxy forwards each call through a [`ProxyHandle`], which runs the
//! interceptor chain before reaching the target.

mod advice;
mod advisor;
mod auto_proxy;
mod pointcut;
mod proxy;

pub use advice::{
    Advice, AfterAdvice, AfterReturningAdvice, JoinPoint, MethodBeforeAdvice, MethodInterceptor, MethodInvocation,
    Outcome, ThrowsAdvice,
};
pub use advisor::{Advisor, AdvisorAdapter, AdvisorAdapterRegistry, Aspect};
pub use auto_proxy::{AutoProxyCreator, PrototypeTargetSourceCreator, TargetSourceCreator, AUTO_PROXY_CREATOR_BEAN_NAME};
pub use pointcut::{can_apply, ExpressionPointcut, NameMatchPointcut, Pointcut, TruePointcut};
pub use proxy::{AopContext, PrototypeTargetSource, ProxyHandle, ProxyKind, SingletonTargetSource, TargetSource};
