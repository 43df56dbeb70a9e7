

pub trait Curve: Send + Sync {
    fn value(&self, x: f64) -> f64;
}
