//! Key LEDs: one WS2812 per logical key, lit while the key is touched.

use smart_leds::RGB8;
use touch_core::{LightingConfig, LogicalKey, TouchFrame, KEY_COUNT};

/// LEDs on the strip, in logical key order.
pub const LED_COUNT: usize = KEY_COUNT;

/// Colors for every LED, brightness applied.
#[must_use]
pub fn render(frame: TouchFrame, config: &LightingConfig) -> [RGB8; LED_COUNT] {
    let mut colors = [RGB8::default(); LED_COUNT];
    for (led, key) in colors.iter_mut().zip(LogicalKey::all()) {
        let c = config.color(frame.touched(key));
        *led = RGB8::new(c.r, c.g, c.b);
    }
    colors
}
