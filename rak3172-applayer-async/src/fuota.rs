//! Fragmented data block transport for firmware updates over the air.
//!
//! Receives a server-driven fragmentation session on the FUOTA port:
//! session setup, data fragments and the closing delete command. Fragments
//! land in a caller-supplied [`FragmentStorage`], typically backed by flash;
//! [`SliceStorage`] covers the in-RAM case.

use embassy_time::{Duration, Instant};
use embedded_io_async::Write;
use log::{debug, info, warn};
use rak3172_async::at::lorawan::MulticastGroup;
use rak3172_async::conf::TransmitOptions;
use rak3172_async::{Error, Rak3172};

use crate::multicast;

/// Default FUOTA application port.
pub const DEFAULT_PORT: u8 = 201;

/// Package identifier reported in version answers.
const PACKAGE_IDENTIFIER: u8 = 3;
/// Most fragments a session can carry (14-bit fragment numbers).
const MAX_FRAGMENTS: usize = 1 << 14;
const BITMAP_WORDS: usize = MAX_FRAGMENTS / 32;

const PACKAGE_VERSION_CMD: u8 = 0x00;
const SESSION_SETUP_CMD: u8 = 0x02;
const SESSION_DELETE_CMD: u8 = 0x03;
const DATA_FRAGMENT_CMD: u8 = 0x08;

/// Where received fragments are persisted.
///
/// Offsets are byte positions inside the assembled data block. The
/// implementation decides where the block actually lives.
pub trait FragmentStorage {
    type Error: core::fmt::Debug;

    /// Bytes available for the assembled block.
    fn capacity(&self) -> usize;

    /// Writes a fragment at the given offset.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads part of the assembled block back.
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error>;
}

/// Offset or length outside the storage block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds;

/// [`FragmentStorage`] backed by a caller-provided RAM slice.
pub struct SliceStorage<'a> {
    data: &'a mut [u8],
}

impl<'a> SliceStorage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }
}

impl FragmentStorage for SliceStorage<'_> {
    type Error = OutOfBounds;

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), OutOfBounds> {
        let end = offset.checked_add(data.len()).ok_or(OutOfBounds)?;
        let slot = self.data.get_mut(offset..end).ok_or(OutOfBounds)?;
        slot.copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), OutOfBounds> {
        let end = offset.checked_add(buf.len()).ok_or(OutOfBounds)?;
        let slot = self.data.get(offset..end).ok_or(OutOfBounds)?;
        buf.copy_from_slice(slot);
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct FragSession {
    index: u8,
    nb_frag: u16,
    frag_size: u8,
    padding: u8,
}

/// Fragmentation transport session state.
pub struct Fuota<S> {
    storage: S,
    port: u8,
    package_version: u8,
    session: Option<FragSession>,
    received: u16,
    bitmap: [u32; BITMAP_WORDS],
}

impl<S: FragmentStorage> Fuota<S> {
    /// Creates a transport writing into `storage`.
    pub fn new(storage: S, port: u8, package_version: u8) -> Self {
        Self {
            storage,
            port,
            package_version,
            session: None,
            received: 0,
            bitmap: [0; BITMAP_WORDS],
        }
    }

    /// Runs the transport until the server closes the session.
    ///
    /// Every downlink on the FUOTA port is dispatched on its command byte;
    /// other ports are ignored. The loop ends successfully on the server's
    /// delete command, with [`Error::Timeout`] when the deadline passes, and
    /// with [`Error::NoMemory`] when a session does not fit the storage.
    ///
    /// # Arguments
    ///
    /// * `radio` - A joined LoRaWAN session.
    /// * `group` - Optional multicast group carrying the fragments.
    /// * `timeout` - Overall wall-clock budget for the transfer.
    pub async fn run<W: Write>(
        &mut self,
        radio: &mut Rak3172<'_, W>,
        group: Option<&MulticastGroup>,
        timeout: Duration,
    ) -> Result<(), Error<W::Error>> {
        let prior = multicast::enter(radio, group).await?;
        let result = self.run_inner(radio, timeout).await;
        multicast::restore(radio, group, prior).await;
        result
    }

    async fn run_inner<W: Write>(
        &mut self,
        radio: &mut Rak3172<'_, W>,
        timeout: Duration,
    ) -> Result<(), Error<W::Error>> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            let message = match radio.receive(deadline - now).await {
                Ok(message) => message,
                Err(Error::Timeout) => {
                    warn!("fragment transfer timed out with {} received", self.received);
                    return Err(Error::Timeout);
                }
                Err(err) => return Err(err),
            };
            if message.port != self.port {
                debug!("ignoring downlink on port {}", message.port);
                continue;
            }
            let Some((&command, body)) = message.payload.split_first() else {
                continue;
            };
            match command {
                PACKAGE_VERSION_CMD => self.answer_version(radio).await?,
                SESSION_SETUP_CMD => self.session_setup(radio, body).await?,
                SESSION_DELETE_CMD => {
                    self.session_delete(radio, body).await?;
                    return Ok(());
                }
                DATA_FRAGMENT_CMD => self.data_fragment(body)?,
                other => debug!("unhandled fuota command 0x{other:02x}"),
            }
        }
    }

    /// Fragments stored so far.
    pub fn received_fragments(&self) -> u16 {
        self.received
    }

    /// Whether every fragment of the current session has arrived.
    pub fn is_complete(&self) -> bool {
        self.session
            .is_some_and(|session| self.received >= session.nb_frag)
    }

    /// Length of the assembled block without padding, once complete.
    pub fn block_len(&self) -> Option<usize> {
        let session = self.session?;
        if self.received < session.nb_frag {
            return None;
        }
        Some(session.nb_frag as usize * session.frag_size as usize - session.padding as usize)
    }

    /// Borrows the underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Gives the underlying storage back.
    pub fn into_storage(self) -> S {
        self.storage
    }

    async fn answer_version<W: Write>(
        &mut self,
        radio: &mut Rak3172<'_, W>,
    ) -> Result<(), Error<W::Error>> {
        let answer = [PACKAGE_VERSION_CMD, PACKAGE_IDENTIFIER, self.package_version];
        radio
            .transmit(self.port, &answer, &TransmitOptions::default())
            .await
    }

    async fn session_setup<W: Write>(
        &mut self,
        radio: &mut Rak3172<'_, W>,
        body: &[u8],
    ) -> Result<(), Error<W::Error>> {
        if body.len() < 10 {
            warn!("short fragmentation setup request");
            return Ok(());
        }
        let index = (body[0] >> 4) & 0x03;
        let nb_frag = u16::from_le_bytes([body[1], body[2]]);
        let frag_size = body[3];
        let algo = (body[4] >> 3) & 0x07;
        let padding = body[5];
        let mut status = index << 6;
        if algo != 0 {
            warn!("fragmentation algorithm {algo} not supported");
            status |= 1 << 0;
        }
        let needed = nb_frag as usize * frag_size as usize;
        let fits = needed <= self.storage.capacity();
        if !fits {
            warn!(
                "data block of {needed} bytes exceeds the {} byte storage",
                self.storage.capacity()
            );
            status |= 1 << 1;
        }
        if status & 0x3F == 0 {
            self.session = Some(FragSession {
                index,
                nb_frag,
                frag_size,
                padding,
            });
            self.received = 0;
            self.bitmap = [0; BITMAP_WORDS];
            info!("fragmentation session {index}: {nb_frag} fragments of {frag_size} bytes");
        }
        let answer = [SESSION_SETUP_CMD, status];
        radio
            .transmit(self.port, &answer, &TransmitOptions::default())
            .await?;
        if !fits {
            return Err(Error::NoMemory);
        }
        Ok(())
    }

    async fn session_delete<W: Write>(
        &mut self,
        radio: &mut Rak3172<'_, W>,
        body: &[u8],
    ) -> Result<(), Error<W::Error>> {
        let index = body.first().map_or(0, |byte| byte & 0x03);
        info!(
            "fragmentation session {index} closed by the server, {} fragments stored",
            self.received
        );
        let answer = [SESSION_DELETE_CMD, index];
        radio
            .transmit(self.port, &answer, &TransmitOptions::default())
            .await
    }

    fn data_fragment<E>(&mut self, body: &[u8]) -> Result<(), Error<E>> {
        let Some(session) = self.session else {
            warn!("data fragment without a session");
            return Ok(());
        };
        if body.len() < 2 {
            warn!("short data fragment");
            return Ok(());
        }
        let header = u16::from_le_bytes([body[0], body[1]]);
        let index = ((header >> 14) & 0x03) as u8;
        let number = header & 0x3FFF;
        if index != session.index {
            debug!("fragment for session {index}, expected {}", session.index);
            return Ok(());
        }
        if number == 0 || number > session.nb_frag {
            debug!("fragment number {number} outside the session");
            return Ok(());
        }
        let offset = (number as usize - 1) * session.frag_size as usize;
        if let Err(err) = self.storage.write(offset, &body[2..]) {
            warn!("storing fragment {number} failed: {err:?}");
            return Err(Error::CommandFailed);
        }
        if self.mark_received(number) {
            self.received += 1;
            info!("fragment {number} stored, {}/{}", self.received, session.nb_frag);
        } else {
            debug!("duplicate fragment {number}");
        }
        Ok(())
    }

    /// Marks a fragment as seen; false when it already was.
    fn mark_received(&mut self, number: u16) -> bool {
        let bit = (number - 1) as usize;
        let mask = 1u32 << (bit % 32);
        if self.bitmap[bit / 32] & mask != 0 {
            return false;
        }
        self.bitmap[bit / 32] |= mask;
        true
    }
}
