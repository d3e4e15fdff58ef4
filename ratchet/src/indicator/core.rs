use crate::bar::Bar;

pub trait Indicator: Send {
    fn name(&self) -> &str;
    fn reset(&mut self);
    fn update(&mut self, bar: &Bar) -> Option<f64>;
}
