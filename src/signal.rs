//! Named adapter signals.  A layout describes each reset line, output enable or LED as a set of
//! GPIO bit masks, and the registry drives them while keeping a shadow copy of the 16 GPIO
//! output and direction bits.  The shadow is shared with everything else that touches the
//! GPIOs (SWDIO direction switching in particular), so all GPIO writes go through here.
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::str::FromStr;

use tracing::{debug, error};

use crate::cable::Transport;
use crate::error::{Error, SignalOperation};

/// The activity indicator toggled around every batch, if the layout has one.
pub const LED: &str = "LED";
/// Enables the SWDIO output buffer on adapters with a separate one.
pub const SWDIO_OE: &str = "SWDIO_OE";
/// Must be defined for SWD; asserted when the adapter is opened in SWD mode.
pub const SWD_EN: &str = "SWD_EN";

// GPIO bit of TDI/DO, released while the target drives SWDIO on adapters that tie TDI and TDO
// together.
const SWDIO_DIRECTION: u16 = 0x0002;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Signal {
    pub data_mask: u16,
    pub input_mask: u16,
    pub oe_mask: u16,
    pub invert_data: bool,
    pub invert_input: bool,
    pub invert_oe: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalLevel {
    Low,
    High,
    HighZ,
}

impl TryFrom<char> for SignalLevel {
    type Error = Error;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            '0' => Ok(SignalLevel::Low),
            '1' => Ok(SignalLevel::High),
            'z' | 'Z' => Ok(SignalLevel::HighZ),
            other => Err(Error::Config(format!(
                "invalid signal level specifier '{other}', use 0, 1 or z"
            ))),
        }
    }
}

impl FromStr for SignalLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => SignalLevel::try_from(c),
            _ => Err(Error::Config(format!(
                "unknown signal level '{s}', use 0, 1 or z"
            ))),
        }
    }
}

/// Output values and directions (1 = output) of all 16 GPIO bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpioState {
    pub output: u16,
    pub direction: u16,
}

impl GpioState {
    fn low(&self) -> (u8, u8) {
        (self.output as u8, self.direction as u8)
    }

    fn high(&self) -> (u8, u8) {
        ((self.output >> 8) as u8, (self.direction >> 8) as u8)
    }
}

/// Definition of one signal, built like a layout directive:
/// `LayoutSignal::new().data(0x0100).noe(0x0400)`.
///
/// Options take effect in the order they are given, so a mask set after an alias replaces the
/// one copied from it.  An alias copies all three masks from the aliased signal, combines the
/// data and input inversions with its own and copies the output-enable inversion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayoutSignal {
    options: Vec<LayoutOption>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum LayoutOption {
    Data { mask: u16, invert: bool },
    Input { mask: u16, invert: bool },
    Oe { mask: u16, invert: bool },
    Alias { name: String, invert: bool },
}

impl LayoutSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, option: LayoutOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn data(self, mask: u16) -> Self {
        self.with(LayoutOption::Data { mask, invert: false })
    }

    pub fn ndata(self, mask: u16) -> Self {
        self.with(LayoutOption::Data { mask, invert: true })
    }

    pub fn input(self, mask: u16) -> Self {
        self.with(LayoutOption::Input { mask, invert: false })
    }

    pub fn ninput(self, mask: u16) -> Self {
        self.with(LayoutOption::Input { mask, invert: true })
    }

    pub fn oe(self, mask: u16) -> Self {
        self.with(LayoutOption::Oe { mask, invert: false })
    }

    pub fn noe(self, mask: u16) -> Self {
        self.with(LayoutOption::Oe { mask, invert: true })
    }

    pub fn alias(self, name: &str) -> Self {
        self.with(LayoutOption::Alias {
            name: name.to_string(),
            invert: false,
        })
    }

    /// Alias with both data and input inverted relative to `name`.
    pub fn nalias(self, name: &str) -> Self {
        self.with(LayoutOption::Alias {
            name: name.to_string(),
            invert: true,
        })
    }
}

impl From<Signal> for LayoutSignal {
    fn from(signal: Signal) -> Self {
        LayoutSignal::new()
            .with(LayoutOption::Data {
                mask: signal.data_mask,
                invert: signal.invert_data,
            })
            .with(LayoutOption::Input {
                mask: signal.input_mask,
                invert: signal.invert_input,
            })
            .with(LayoutOption::Oe {
                mask: signal.oe_mask,
                invert: signal.invert_oe,
            })
    }
}

#[derive(Clone, Debug, Default)]
pub struct SignalRegistry {
    signals: BTreeMap<String, Signal>,
    gpio: GpioState,
    init: GpioState,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite the signal `name`.
    pub fn define(&mut self, name: &str, layout: LayoutSignal) -> Result<(), Error> {
        let mut signal = Signal::default();
        for option in &layout.options {
            match option {
                LayoutOption::Data { mask, invert } => {
                    signal.data_mask = *mask;
                    signal.invert_data = *invert;
                }
                LayoutOption::Input { mask, invert } => {
                    signal.input_mask = *mask;
                    signal.invert_input = *invert;
                }
                LayoutOption::Oe { mask, invert } => {
                    signal.oe_mask = *mask;
                    signal.invert_oe = *invert;
                }
                LayoutOption::Alias { name: source, invert } => {
                    let Some(aliased) = self.signals.get(source) else {
                        error!("signal {} is not defined", source);
                        return Err(Error::Config(format!("signal {source} is not defined")));
                    };
                    signal.data_mask = aliased.data_mask;
                    signal.input_mask = aliased.input_mask;
                    signal.oe_mask = aliased.oe_mask;
                    if *invert {
                        signal.invert_data = true;
                        signal.invert_input = true;
                    }
                    signal.invert_data ^= aliased.invert_data;
                    signal.invert_input ^= aliased.invert_input;
                    signal.invert_oe = aliased.invert_oe;
                }
            }
        }

        debug!("signal {}: {:?}", name, signal);
        self.signals.insert(name.to_string(), signal);
        Ok(())
    }

    /// Define a plain, non-inverted data signal unless the layout already has one by that name.
    pub fn define_default(&mut self, name: &str, data_mask: u16) {
        self.signals.entry(name.to_string()).or_insert(Signal {
            data_mask,
            ..Signal::default()
        });
    }

    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    /// The shadow copy of the GPIO outputs and directions.
    pub fn gpio(&self) -> GpioState {
        self.gpio
    }

    /// The layout's initial GPIO state.
    pub fn init_state(&self) -> GpioState {
        self.init
    }

    /// Replace the initial GPIO state and reset the shadow to it.  Nothing is written until
    /// `write_all`.
    pub fn set_init_state(&mut self, init: GpioState) {
        self.init = init;
        self.gpio = init;
    }

    /// Write both GPIO bytes from the shadow, changed or not.
    pub fn write_all<U>(&self, transport: &mut U) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        let (value, direction) = self.gpio.low();
        transport.set_gpio_low(value, direction)?;
        let (value, direction) = self.gpio.high();
        transport.set_gpio_high(value, direction)?;
        Ok(())
    }

    /// Drive `name` to `level`.  Only the GPIO bytes whose value or direction changed are
    /// written to the transport.
    pub fn set<U>(&mut self, transport: &mut U, name: &str, level: SignalLevel) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        let signal = *self.lookup(name)?;
        let unsupported = |operation| Error::UnsupportedSignal {
            name: name.to_string(),
            operation,
        };

        if signal.data_mask == 0 && signal.oe_mask == 0 {
            error!("interface doesn't provide signal '{}'", name);
            return Err(unsupported(SignalOperation::Use));
        }

        let (data, oe) = match level {
            SignalLevel::Low => (signal.invert_data, !signal.invert_oe),
            SignalLevel::High => {
                if signal.data_mask == 0 {
                    error!("interface can't drive '{}' high", name);
                    return Err(unsupported(SignalOperation::DriveHigh));
                }
                (!signal.invert_data, !signal.invert_oe)
            }
            SignalLevel::HighZ => {
                if signal.oe_mask == 0 {
                    error!("interface can't tri-state '{}'", name);
                    return Err(unsupported(SignalOperation::TriState));
                }
                (signal.invert_data, signal.invert_oe)
            }
        };

        let mut gpio = self.gpio;
        gpio.output = apply_mask(gpio.output, signal.data_mask, data);
        if signal.oe_mask == signal.data_mask {
            gpio.direction = apply_mask(gpio.direction, signal.oe_mask, oe);
        } else {
            gpio.output = apply_mask(gpio.output, signal.oe_mask, oe);
        }

        self.update(transport, gpio)
    }

    /// Drive the `LED` signal, if the layout has one.  Failures are logged and otherwise
    /// ignored; the indicator is cosmetic.
    pub fn indicate<U>(&mut self, transport: &mut U, on: bool)
    where
        U: Transport + ?Sized,
    {
        if !self.contains(LED) {
            return;
        }
        let level = if on { SignalLevel::High } else { SignalLevel::Low };
        if let Err(e) = self.set(transport, LED, level) {
            debug!("failed to drive {}: {}", LED, e);
        }
    }

    /// Read `name`.  The result is masked with the signal's input mask and inverted when the
    /// input is.
    pub fn get<U>(&self, transport: &mut U, name: &str) -> Result<u16, Error>
    where
        U: Transport + ?Sized,
    {
        let signal = self.lookup(name)?;
        if signal.input_mask == 0 {
            error!("interface doesn't provide signal '{}'", name);
            return Err(Error::UnsupportedSignal {
                name: name.to_string(),
                operation: SignalOperation::Read,
            });
        }

        let mut value = 0u16;
        if signal.input_mask & 0xff != 0 {
            value |= transport.read_gpio_low()? as u16;
        }
        if signal.input_mask >> 8 != 0 {
            value |= (transport.read_gpio_high()? as u16) << 8;
        }
        if signal.invert_input {
            value = !value;
        }

        Ok(value & signal.input_mask)
    }

    /// Hand SWDIO to the adapter (`enable`) or to the target.  Does nothing unless the layout
    /// defines `SWDIO_OE`.  An `SWDIO_OE` without a data mask means TDI and TDO are both wired
    /// to SWDIO, and the TDI pin is switched to an input instead.
    pub(crate) fn swdio_drive<U>(&mut self, transport: &mut U, enable: bool) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        let Some(oe) = self.signals.get(SWDIO_OE).copied() else {
            return Ok(());
        };
        if oe.data_mask != 0 {
            let level = if enable { SignalLevel::High } else { SignalLevel::Low };
            self.set(transport, SWDIO_OE, level)
        } else {
            self.set_direction_from_init(transport, SWDIO_DIRECTION, enable)
        }
    }

    fn set_direction_from_init<U>(
        &mut self,
        transport: &mut U,
        mask: u16,
        output: bool,
    ) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        if output {
            self.gpio.direction |= self.init.direction & mask;
        } else {
            self.gpio.direction &= !mask;
        }
        let (value, direction) = self.gpio.low();
        transport.set_gpio_low(value, direction)?;
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<&Signal, Error> {
        self.signals.get(name).ok_or_else(|| {
            error!("interface configuration doesn't define signal '{}'", name);
            Error::Config(format!(
                "interface configuration doesn't define signal '{name}'"
            ))
        })
    }

    fn update<U>(&mut self, transport: &mut U, gpio: GpioState) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        let old = core::mem::replace(&mut self.gpio, gpio);
        if gpio.low() != old.low() {
            let (value, direction) = gpio.low();
            transport.set_gpio_low(value, direction)?;
        }
        if gpio.high() != old.high() {
            let (value, direction) = gpio.high();
            transport.set_gpio_high(value, direction)?;
        }
        Ok(())
    }
}

fn apply_mask(word: u16, mask: u16, set: bool) -> u16 {
    if set {
        word | mask
    } else {
        word & !mask
    }
}
