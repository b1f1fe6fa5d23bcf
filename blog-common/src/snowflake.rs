//! Module for working with snowflake IDs.
//!
//! Layout, most significant bit first: 42 bits of milliseconds since the
//! epoch, 5 bits worker id, 5 bits process id, 12 bits increment.
//!
//! See <https://discord.com/developers/docs/reference#snowflakes>

use derive_where::derive_where;
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_BITS: u32 = 42;
pub const WORKER_ID_BITS: u32 = 5;
pub const PROCESS_ID_BITS: u32 = 5;
pub const INCREMENT_BITS: u32 = 12;

const INCREMENT_SHIFT: u32 = 0;
const PROCESS_ID_SHIFT: u32 = INCREMENT_SHIFT + INCREMENT_BITS;
const WORKER_ID_SHIFT: u32 = PROCESS_ID_SHIFT + PROCESS_ID_BITS;
const TIMESTAMP_SHIFT: u32 = WORKER_ID_SHIFT + WORKER_ID_BITS;

const fn low_bits(bits: u32) -> u64 {
    (1 << bits) - 1
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeError {
    #[error("Time {0} lies before the snowflake epoch.")]
    BeforeEpoch(UtcDateTime),
    #[error("Time {0} does not fit into a snowflake timestamp.")]
    TooLate(UtcDateTime),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("{part} must be at most {max}, got {value}")]
pub struct PartOutOfRangeError {
    part: &'static str,
    value: u64,
    max: u64,
}

macro_rules! bounded_part {
    ($name:ident: $repr:ty, bits = $bits:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
        pub struct $name($repr);

        impl $name {
            #[allow(clippy::cast_possible_truncation)]
            pub const MAX: $repr = low_bits($bits) as $repr;

            #[must_use]
            pub fn new(value: $repr) -> Option<Self> {
                (value <= Self::MAX).then_some(Self(value))
            }

            #[must_use]
            pub fn get(self) -> $repr {
                self.0
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = PartOutOfRangeError;

            fn try_from(value: $repr) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(PartOutOfRangeError {
                    part: stringify!($name),
                    value: value.into(),
                    max: Self::MAX.into(),
                })
            }
        }
    };
}

bounded_part!(WorkerId: u8, bits = WORKER_ID_BITS);
bounded_part!(ProcessId: u8, bits = PROCESS_ID_BITS);
bounded_part!(Increment: u16, bits = INCREMENT_BITS);

impl Increment {
    /// Wraps around to zero after [`Increment::MAX`].
    #[must_use]
    pub fn next(self) -> Self {
        Self((self.0 + 1) & Self::MAX)
    }
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    /// Returns `None` if `millis` needs more than [`TIMESTAMP_BITS`] bits.
    #[must_use]
    pub fn from_parts(
        millis: u64,
        worker_id: WorkerId,
        process_id: ProcessId,
        increment: Increment,
    ) -> Option<Self> {
        if millis > low_bits(TIMESTAMP_BITS) {
            return None;
        }

        Some(Self::new(
            (millis << TIMESTAMP_SHIFT)
                | (u64::from(worker_id.get()) << WORKER_ID_SHIFT)
                | (u64::from(process_id.get()) << PROCESS_ID_SHIFT)
                | (u64::from(increment.get()) << INCREMENT_SHIFT),
        ))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn millis(self) -> u64 {
        self.0 >> TIMESTAMP_SHIFT
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn worker_id(self) -> WorkerId {
        WorkerId(((self.0 >> WORKER_ID_SHIFT) & low_bits(WORKER_ID_BITS)) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn process_id(self) -> ProcessId {
        ProcessId(((self.0 >> PROCESS_ID_SHIFT) & low_bits(PROCESS_ID_BITS)) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn increment(self) -> Increment {
        Increment(((self.0 >> INCREMENT_SHIFT) & low_bits(INCREMENT_BITS)) as u16)
    }

    #[must_use]
    pub fn created_at(self) -> UtcDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(self.millis().cast_signed())
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

fn millis_since_epoch<SnowflakeEpoch: Epoch>(time: UtcDateTime) -> Result<u64, SnowflakeError> {
    let millis = (time - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
    if millis < 0 {
        return Err(SnowflakeError::BeforeEpoch(time));
    }

    u64::try_from(millis)
        .ok()
        .filter(|&millis| millis <= low_bits(TIMESTAMP_BITS))
        .ok_or(SnowflakeError::TooLate(time))
}

/// Hands out strictly increasing snowflakes for one worker/process pair.
///
/// When the increment is exhausted within one millisecond, or the clock moves
/// backwards, the generator keeps counting from the last timestamp it used.
#[derive_where(Clone, Debug)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    last_millis: Option<u64>,
    increment: Increment,
    phantom_data: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch: Epoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last_millis: None,
            increment: Increment::default(),
            phantom_data: PhantomData,
        }
    }

    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    #[must_use]
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeError> {
        let now = millis_since_epoch::<SnowflakeEpoch>(time)?;

        let (millis, increment) = match self.last_millis {
            Some(last) if now <= last => {
                let increment = self.increment.next();
                if increment == Increment::default() {
                    (last + 1, increment)
                } else {
                    (last, increment)
                }
            }
            _ => (now, Increment::default()),
        };

        let snowflake =
            Snowflake::from_parts(millis, self.worker_id, self.process_id, increment)
                .ok_or(SnowflakeError::TooLate(time))?;

        self.last_millis = Some(millis);
        self.increment = increment;

        Ok(snowflake)
    }

    pub fn generate(&mut self) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeError> {
        self.generate_at(UtcDateTime::now())
    }
}

#[cfg(test)]
mod tests {
    use crate::snowflake::{
        Epoch, Increment, ProcessId, Snowflake, SnowflakeError, SnowflakeGenerator, WorkerId,
    };
    use time::{Duration, UtcDateTime, macros::utc_datetime};

    struct MillennialEpoch;
    impl Epoch for MillennialEpoch {
        const EPOCH_TIME: UtcDateTime = utc_datetime!(2000-01-01 00:00);
    }

    #[test]
    fn part_ranges() {
        assert!(WorkerId::new(0x1F).is_some());
        assert!(WorkerId::new(0x20).is_none());
        assert!(ProcessId::new(0).is_some());
        assert!(ProcessId::try_from(u8::MAX).is_err());
        assert!(Increment::new(0xFFF).is_some());
        assert!(Increment::new(0x1000).is_none());

        assert_eq!(Increment::new(0xFFF).unwrap().next(), Increment::default());
    }

    #[test]
    fn parts_are_recovered() {
        let worker_id = WorkerId::new(0b10101).unwrap();
        let process_id = ProcessId::new(0b10001).unwrap();
        let increment = Increment::new(100).unwrap();

        let snowflake =
            Snowflake::<MillennialEpoch>::from_parts(814_620_600_000, worker_id, process_id, increment)
                .unwrap();

        assert_eq!(snowflake.millis(), 814_620_600_000);
        assert_eq!(snowflake.worker_id(), worker_id);
        assert_eq!(snowflake.process_id(), process_id);
        assert_eq!(snowflake.increment(), increment);
        assert_eq!(
            snowflake.created_at(),
            MillennialEpoch::EPOCH_TIME + Duration::milliseconds(814_620_600_000)
        );

        assert!(
            Snowflake::<MillennialEpoch>::from_parts(1 << 42, worker_id, process_id, increment)
                .is_none()
        );
    }

    #[test]
    fn generator_is_strictly_increasing() {
        let worker_id = WorkerId::new(10).unwrap();
        let process_id = ProcessId::new(0).unwrap();
        let time = utc_datetime!(2025-10-24 10:55);

        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(worker_id, process_id);

        let first = generator.generate_at(time).unwrap();
        let second = generator.generate_at(time).unwrap();
        let earlier = generator
            .generate_at(time - Duration::seconds(5))
            .unwrap();

        assert!(first < second);
        assert!(second < earlier);
        assert_eq!(first.increment().get(), 0);
        assert_eq!(second.increment().get(), 1);
        assert_eq!(first.worker_id(), worker_id);
    }

    #[test]
    fn generator_borrows_next_millisecond_on_wrap() {
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(
            WorkerId::default(),
            ProcessId::default(),
        );
        let time = utc_datetime!(2025-10-24 10:55);

        let first = generator.generate_at(time).unwrap();
        let mut last = first;
        for _ in 0..=Increment::MAX {
            last = generator.generate_at(time).unwrap();
        }

        assert_eq!(last.millis(), first.millis() + 1);
        assert_eq!(last.increment(), Increment::default());
    }

    #[test]
    fn generator_rejects_time_before_epoch() {
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(
            WorkerId::default(),
            ProcessId::default(),
        );
        let time = MillennialEpoch::EPOCH_TIME - Duration::milliseconds(1);

        assert_eq!(
            generator.generate_at(time),
            Err(SnowflakeError::BeforeEpoch(time))
        );
    }
}
