//! Command sequencing for ILI9486-class TFT controllers.
//!
//! The transport is abstracted behind [`PanelBus`]: a driver for a concrete
//! SPI/GPIO pair implements three primitives (command byte, data bytes,
//! delay) and every primitive returns a typed [`Result`], so a failed transfer
//! surfaces as [`LoopError::HardwareFault`] to the caller instead of halting.
//!
//! Register initialisation is data: a slice of [`InitStep`]s consumed by
//! [`send_sequence`].  [`ILI9486_INIT`] is a reference table for a 16-bit
//! colour panel; boards with different glass pass their own table to
//! [`Panel::init_with`].
//!
//! [`Panel`] is an explicit handle that owns its bus.  There is no global
//! peripheral state, so several panels (or a recording fake in tests) can
//! coexist.

use pidloop_types::LoopError;
use tracing::debug;

/// Controller command bytes used by this module.
pub mod command {
    pub const SOFT_RESET: u8 = 0x01;
    pub const SLEEP_OUT: u8 = 0x11;
    pub const DISPLAY_OFF: u8 = 0x28;
    pub const DISPLAY_ON: u8 = 0x29;
    pub const COLUMN_ADDRESS_SET: u8 = 0x2A;
    pub const PAGE_ADDRESS_SET: u8 = 0x2B;
    pub const MEMORY_WRITE: u8 = 0x2C;
    pub const MEMORY_ACCESS_CONTROL: u8 = 0x36;
    pub const PIXEL_FORMAT: u8 = 0x3A;
    pub const INTERFACE_MODE: u8 = 0xB0;
    pub const FRAME_RATE: u8 = 0xB1;
    pub const INVERSION_CONTROL: u8 = 0xB4;
    pub const POSITIVE_GAMMA: u8 = 0xE0;
    pub const NEGATIVE_GAMMA: u8 = 0xE1;
    pub const DIGITAL_GAMMA: u8 = 0xE2;
}

/// Transport to a display controller (4-wire SPI with a D/C line, 8080
/// parallel, or a test fake).
pub trait PanelBus {
    /// Send one byte with D/C low.
    fn write_command(&mut self, command: u8) -> Result<(), LoopError>;

    /// Send parameter or pixel bytes with D/C high.
    fn write_data(&mut self, data: &[u8]) -> Result<(), LoopError>;

    /// Block for at least `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32) -> Result<(), LoopError>;
}

/// One entry of an initialisation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitStep {
    pub command: u8,
    pub params: &'static [u8],
    /// Delay after the step; `0` for none.
    pub delay_ms: u32,
}

impl InitStep {
    pub const fn new(command: u8, params: &'static [u8]) -> Self {
        Self {
            command,
            params,
            delay_ms: 0,
        }
    }

    pub const fn with_delay(command: u8, params: &'static [u8], delay_ms: u32) -> Self {
        Self {
            command,
            params,
            delay_ms,
        }
    }
}

const GAMMA_POSITIVE: &[u8] = &[
    0x0F, 0x1F, 0x1C, 0x0C, 0x0F, 0x08, 0x48, 0x98, 0x37, 0x0A, 0x13, 0x04, 0x11, 0x0D, 0x00,
];
const GAMMA_NEGATIVE: &[u8] = &[
    0x0F, 0x32, 0x2E, 0x0B, 0x0D, 0x05, 0x47, 0x75, 0x37, 0x06, 0x10, 0x03, 0x24, 0x20, 0x00,
];

/// Reference bring-up for an ILI9486 in 16 bits/pixel mode, portrait,
/// lowest frame rate, 2-dot inversion.  Ends with the panel awake but the
/// display still off.
pub const ILI9486_INIT: &[InitStep] = &[
    InitStep::with_delay(command::SOFT_RESET, &[], 10),
    InitStep::new(command::INTERFACE_MODE, &[0x00]),
    InitStep::new(command::PIXEL_FORMAT, &[0x55]),
    InitStep::new(command::POSITIVE_GAMMA, GAMMA_POSITIVE),
    InitStep::new(command::NEGATIVE_GAMMA, GAMMA_NEGATIVE),
    InitStep::new(command::DIGITAL_GAMMA, GAMMA_NEGATIVE),
    InitStep::new(command::MEMORY_ACCESS_CONTROL, &[0x10]),
    InitStep::new(command::FRAME_RATE, &[0x00, 0x11]),
    InitStep::new(command::INVERSION_CONTROL, &[0x12]),
    InitStep::with_delay(command::SLEEP_OUT, &[], 10),
];

/// Replay `steps` on `bus` in order, stopping at the first failed transfer.
pub fn send_sequence<B: PanelBus + ?Sized>(bus: &mut B, steps: &[InitStep]) -> Result<(), LoopError> {
    for step in steps {
        bus.write_command(step.command)?;
        if !step.params.is_empty() {
            bus.write_data(step.params)?;
        }
        if step.delay_ms > 0 {
            bus.delay_ms(step.delay_ms)?;
        }
    }
    Ok(())
}

/// Inclusive rectangle of display memory targeted by the next pixel write.
///
/// Only constructible through [`Window::new`] and [`Window::pixel`], so
/// `x0 <= x1` and `y0 <= y1` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    x0: u16,
    y0: u16,
    x1: u16,
    y1: u16,
}

impl Window {
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidWindow`] when `x0 > x1` or `y0 > y1`.
    pub fn new(x0: u16, y0: u16, x1: u16, y1: u16) -> Result<Self, LoopError> {
        let window = Self { x0, y0, x1, y1 };
        window.validate()?;
        Ok(window)
    }

    /// Single-pixel window.
    pub fn pixel(x: u16, y: u16) -> Self {
        Self {
            x0: x,
            y0: y,
            x1: x,
            y1: y,
        }
    }

    fn validate(&self) -> Result<(), LoopError> {
        if self.x0 > self.x1 || self.y0 > self.y1 {
            return Err(self.invalid());
        }
        Ok(())
    }

    fn invalid(&self) -> LoopError {
        LoopError::InvalidWindow {
            x0: self.x0,
            y0: self.y0,
            x1: self.x1,
            y1: self.y1,
        }
    }

    /// First column.
    pub fn x0(&self) -> u16 {
        self.x0
    }

    /// First row.
    pub fn y0(&self) -> u16 {
        self.y0
    }

    /// Last column (inclusive).
    pub fn x1(&self) -> u16 {
        self.x1
    }

    /// Last row (inclusive).
    pub fn y1(&self) -> u16 {
        self.y1
    }

    pub fn width(&self) -> u32 {
        u32::from(self.x1.saturating_sub(self.x0)) + 1
    }

    pub fn height(&self) -> u32 {
        u32::from(self.y1.saturating_sub(self.y0)) + 1
    }

    /// Number of RGB565 values [`Panel::write_pixels`] expects.
    pub fn pixel_count(&self) -> u32 {
        self.width() * self.height()
    }
}

/// Pixels converted to bytes per [`PanelBus::write_data`] call.
const PIXEL_CHUNK: usize = 256;

/// Native resolution of an ILI9486 in portrait orientation.
pub const ILI9486_WIDTH: u16 = 320;
pub const ILI9486_HEIGHT: u16 = 480;

/// Handle to one display controller, owning its bus.
pub struct Panel<B: PanelBus> {
    bus: B,
    width: u16,
    height: u16,
}

impl<B: PanelBus> Panel<B> {
    /// Wrap `bus` as a 320×480 ILI9486 panel.
    pub fn new(bus: B) -> Self {
        Self::with_size(bus, ILI9486_WIDTH, ILI9486_HEIGHT)
    }

    pub fn with_size(bus: B, width: u16, height: u16) -> Self {
        Self { bus, width, height }
    }

    /// Run [`ILI9486_INIT`] and switch the display on.
    pub fn init(&mut self) -> Result<(), LoopError> {
        self.init_with(ILI9486_INIT)
    }

    /// Run a custom initialisation table and switch the display on.
    pub fn init_with(&mut self, steps: &[InitStep]) -> Result<(), LoopError> {
        debug!(steps = steps.len(), "panel init sequence");
        send_sequence(&mut self.bus, steps)?;
        self.display_on(true)
    }

    /// Select the addressing window and open a memory write, so the next
    /// [`PanelBus::write_data`] streams pixels into it.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidWindow`] when the window is inverted or
    /// exceeds the panel, or any bus error.
    pub fn set_window(&mut self, window: Window) -> Result<(), LoopError> {
        window.validate()?;
        if window.x1 >= self.width || window.y1 >= self.height {
            return Err(window.invalid());
        }
        let [x0h, x0l] = window.x0.to_be_bytes();
        let [x1h, x1l] = window.x1.to_be_bytes();
        let [y0h, y0l] = window.y0.to_be_bytes();
        let [y1h, y1l] = window.y1.to_be_bytes();

        self.bus.write_command(command::COLUMN_ADDRESS_SET)?;
        self.bus.write_data(&[x0h, x0l, x1h, x1l])?;
        self.bus.write_command(command::PAGE_ADDRESS_SET)?;
        self.bus.write_data(&[y0h, y0l, y1h, y1l])?;
        self.bus.write_command(command::MEMORY_WRITE)
    }

    /// Fill `window` with RGB565 `pixels`, row-major, sent most significant
    /// byte first.
    ///
    /// # Errors
    ///
    /// - [`LoopError::PixelCount`] when `pixels.len()` is not exactly
    ///   [`Window::pixel_count`]; nothing is sent.
    /// - Any error from [`set_window`][Self::set_window] or the bus.
    pub fn write_pixels(&mut self, window: Window, pixels: &[u16]) -> Result<(), LoopError> {
        let expected = window.pixel_count();
        if pixels.len() != expected as usize {
            return Err(LoopError::PixelCount {
                expected,
                actual: pixels.len(),
            });
        }
        self.set_window(window)?;

        let mut bytes = [0u8; PIXEL_CHUNK * 2];
        for chunk in pixels.chunks(PIXEL_CHUNK) {
            for (dst, px) in bytes.chunks_exact_mut(2).zip(chunk) {
                dst.copy_from_slice(&px.to_be_bytes());
            }
            self.bus.write_data(&bytes[..chunk.len() * 2])?;
        }
        Ok(())
    }

    /// Set one pixel to an RGB565 `color`.
    pub fn set_pixel(&mut self, x: u16, y: u16, color: u16) -> Result<(), LoopError> {
        self.write_pixels(Window::pixel(x, y), &[color])
    }

    /// Switch the display output on (0x29) or off (0x28).
    pub fn display_on(&mut self, on: bool) -> Result<(), LoopError> {
        self.bus.write_command(if on {
            command::DISPLAY_ON
        } else {
            command::DISPLAY_OFF
        })
    }

    /// `(width, height)` in pixels.
    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Release the bus.
    pub fn into_bus(self) -> B {
        self.bus
    }
}
