//! Calculator AOP demo - advice around an interface proxy
//!
//! This example demonstrates:
//! - A logging aspect with before, after, after-returning and after-throwing advice
//! - Auto-proxying a trait-object bean matched by `execution(* calculate.*(..))`
//! - Self-invocation with and without an exposed proxy
//!
//! Run with `RUST_LOG=ferrous_context=debug` to see the refresh phases.

use ferrous_context::aop::{Advice, Advisor, AopContext, Aspect, ProxyHandle};
use ferrous_context::{
    ApplicationContext, BeanDefinition, BeanLookup, DiError, DiResult, LoggingObserver, ProxySettings,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

trait Calculate: Send + Sync {
    fn add(&self, a: i32, b: i32) -> DiResult<i32>;
    fn reduce(&self, a: i32, b: i32) -> DiResult<i32>;
    fn div(&self, a: i32, b: i32) -> DiResult<i32>;
    fn modulo(&self, a: i32, b: i32) -> DiResult<i32>;
}

struct MyCalculator;

impl Calculate for MyCalculator {
    fn add(&self, a: i32, b: i32) -> DiResult<i32> {
        Ok(a + b)
    }

    fn reduce(&self, a: i32, b: i32) -> DiResult<i32> {
        Ok(a - b)
    }

    fn div(&self, a: i32, b: i32) -> DiResult<i32> {
        a.checked_div(b).ok_or_else(|| DiError::invocation("div", "division by zero"))
    }

    fn modulo(&self, a: i32, b: i32) -> DiResult<i32> {
        let sum = match AopContext::current_proxy::<dyn Calculate>() {
            Ok(proxy) => proxy.add(a, b)?,
            Err(_) => self.add(a, b)?,
        };
        println!("    (mod saw {a} + {b} = {sum})");
        Ok(a % b)
    }
}

struct CalculateProxy(ProxyHandle);

impl Calculate for CalculateProxy {
    fn add(&self, a: i32, b: i32) -> DiResult<i32> {
        self.0.invoke::<dyn Calculate, _>("add", &[&a, &b], |t| t.add(a, b))
    }

    fn reduce(&self, a: i32, b: i32) -> DiResult<i32> {
        self.0.invoke::<dyn Calculate, _>("reduce", &[&a, &b], |t| t.reduce(a, b))
    }

    fn div(&self, a: i32, b: i32) -> DiResult<i32> {
        self.0.invoke::<dyn Calculate, _>("div", &[&a, &b], |t| t.div(a, b))
    }

    fn modulo(&self, a: i32, b: i32) -> DiResult<i32> {
        self.0.invoke::<dyn Calculate, _>("mod", &[&a, &b], |t| t.modulo(a, b))
    }
}

struct LogAspect;

impl Aspect for LogAspect {
    fn advisors(&self) -> DiResult<Vec<Advisor>> {
        const POINTCUT: &str = "execution(* calculate.*(..))";
        Ok(vec![
            Advisor::expression(
                POINTCUT,
                Advice::before(|jp| {
                    println!("  [before] {} args {:?}", jp.signature(), jp.args());
                    Ok(())
                }),
            )?,
            Advisor::expression(
                POINTCUT,
                Advice::after(|jp| {
                    println!("  [after] {} in {:?}", jp.signature(), jp.elapsed());
                    Ok(())
                }),
            )?,
            Advisor::expression(
                POINTCUT,
                Advice::after_returning(|jp, value| {
                    println!("  [returning] {} -> {:?}", jp.method(), value.downcast_ref::<i32>());
                    Ok(())
                }),
            )?,
            Advisor::expression(
                POINTCUT,
                Advice::after_throwing(|jp, error| {
                    println!("  [throwing] {} failed: {error}", jp.method());
                    Ok(())
                }),
            )?,
        ])
    }
}

fn context(expose_proxy: bool) -> DiResult<ApplicationContext> {
    let context = ApplicationContext::builder()
        .display_name("calculator")
        .observer(Arc::new(LoggingObserver::with_prefix("calculator")))
        .enable_auto_proxy(ProxySettings::default().expose_proxy(expose_proxy))
        .definition(
            BeanDefinition::trait_object::<dyn Calculate, _>("calculate", |_| {
                Ok(Arc::new(MyCalculator) as Arc<dyn Calculate>)
            })
            .methods(&["add", "reduce", "div", "mod"])
            .interface_proxy::<dyn Calculate, _>("Calculate", |h| Arc::new(CalculateProxy(h))),
        )
        .definition(BeanDefinition::aspect("logAspect", |_| Ok(Arc::new(LogAspect) as Arc<dyn Aspect>)))
        .build();
    context.refresh()?;
    Ok(context)
}

fn main() -> DiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("== proxy not exposed ==");
    let plain = context(false)?;
    let calculate = plain.get_bean_trait::<dyn Calculate>("calculate")?;
    println!("add(2, 3) = {}", calculate.add(2, 3)?);
    println!("reduce(9, 4) = {}", calculate.reduce(9, 4)?);
    if let Err(error) = calculate.div(1, 0) {
        println!("div(1, 0) failed: {error}");
    }
    println!("mod(7, 4) = {}", calculate.modulo(7, 4)?);
    plain.close();

    println!("\n== proxy exposed ==");
    let exposed = context(true)?;
    let calculate = exposed.get_bean_trait::<dyn Calculate>("calculate")?;
    println!("mod(7, 4) = {}", calculate.modulo(7, 4)?);
    exposed.close();

    Ok(())
}
