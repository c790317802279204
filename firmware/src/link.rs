//! UART daisy-chain links (Plug and Socket).
//!
//! Both links use the same framing (see [`midi_proto::FrameParser`]) and the
//! same pair of tasks; only the UART instance and pins differ.
//!
//! # Pins
//!
//! - Plug: UART0, GPIO 0 (TX) / GPIO 1 (RX)
//! - Socket: UART1, GPIO 4 (TX) / GPIO 5 (RX)

use defmt::Format;
use embassy_rp::uart::{Async, Error as UartError, UartRx, UartTx};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use expression_core::{LinkPort, TransportError};
use midi_proto::{EncodeError, FrameError, FrameParser, LinkFrame, FRAME_SIZE};

use crate::QUEUE_DEPTH;

/// Link line rate.
pub const LINK_BAUDRATE: u32 = 115_200;

type FrameSender = Sender<'static, CriticalSectionRawMutex, LinkFrame, QUEUE_DEPTH>;
type FrameReceiver = Receiver<'static, CriticalSectionRawMutex, LinkFrame, QUEUE_DEPTH>;

/// Error type for link I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum LinkError {
    Uart(UartError),
    Frame(FrameError),
    Encode(EncodeError),
}

impl From<UartError> for LinkError {
    fn from(e: UartError) -> Self {
        Self::Uart(e)
    }
}

impl From<FrameError> for LinkError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<EncodeError> for LinkError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

/// Receiving side of a link.
pub struct LinkInput<'d> {
    rx: UartRx<'d, Async>,
    parser: FrameParser,
}

impl<'d> LinkInput<'d> {
    #[must_use]
    pub fn new(rx: UartRx<'d, Async>) -> Self {
        Self {
            rx,
            parser: FrameParser::new(),
        }
    }

    /// Read bytes until a complete frame is decoded.
    ///
    /// A UART error also drops any partially received frame.
    pub async fn receive(&mut self) -> Result<LinkFrame, LinkError> {
        let mut byte = [0u8; 1];

        loop {
            if let Err(e) = self.rx.read(&mut byte).await {
                self.parser.reset();
                return Err(e.into());
            }

            if let Some(frame) = self.parser.push_byte(byte[0])? {
                return Ok(frame);
            }
        }
    }
}

/// Transmitting side of a link.
pub struct LinkOutput<'d> {
    tx: UartTx<'d, Async>,
}

impl<'d> LinkOutput<'d> {
    #[must_use]
    pub fn new(tx: UartTx<'d, Async>) -> Self {
        Self { tx }
    }

    pub async fn send(&mut self, frame: &LinkFrame) -> Result<(), LinkError> {
        let mut buf = [0u8; FRAME_SIZE];
        let len = frame.encode(&mut buf)?;
        self.tx.write(&buf[..len]).await?;
        Ok(())
    }
}

/// Control-loop side of a link.
pub struct QueuedLink {
    inbound: FrameReceiver,
    outbound: FrameSender,
}

impl QueuedLink {
    #[must_use]
    pub fn new(inbound: FrameReceiver, outbound: FrameSender) -> Self {
        Self { inbound, outbound }
    }
}

impl LinkPort for QueuedLink {
    fn try_receive(&mut self) -> Option<LinkFrame> {
        self.inbound.try_receive().ok()
    }

    fn try_send(&mut self, frame: LinkFrame) -> Result<(), TransportError> {
        self.outbound
            .try_send(frame)
            .map_err(|_| TransportError::Full)
    }
}
