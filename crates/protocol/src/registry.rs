//! # Packet Registry
//!
//! Maps packet IDs to packet types and handlers for one connection state.
//!
//! # Architecture
//!
//! A [`PacketRegistryBuilder`] accumulates packet types, handlers and
//! lifecycle hooks. [`PacketRegistryBuilder::build`] freezes them into a
//! [`PacketRegistry`], a dense vector indexed by packet ID, which is shared
//! between connections behind an `Arc` and never mutated again.
//!
//! # Dispatch
//!
//! ```text
//! payload → read varuint32 id → lookup → factory decodes body → handler(ctx, packet)
//! ```
//!
//! - Unknown IDs fail with `UnknownPacketId` and no handler runs
//! - Registered packets without a handler are decoded and dropped
//! - Handler errors are wrapped with the packet's type name
//!
//! # Example
//!
//! ```ignore
//! let registry = PacketRegistryBuilder::<Session>::new("STATUS")
//!     .add_packet_with::<StatusRequest, _>(|session, _| session.send_status())
//!     .add_packet::<PingRequest>()
//!     .build();
//! ```

use bytes::{Buf, Bytes};
use cobble_core::{ProtocolError, Result};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::codecs::read_var_u32;
use crate::packet::{packet_name, Packet};

/// A decoded packet with its concrete type erased
pub type AnyPacket = Box<dyn Any + Send>;

type Factory = fn(&mut Bytes) -> Result<AnyPacket>;

type Handler<C> = Arc<dyn Fn(&mut C, AnyPacket) -> Result<()> + Send + Sync>;

type Hook<C> = Arc<dyn Fn(&mut C) + Send + Sync>;

type ExceptionHook<C> = Arc<dyn Fn(&mut C, &ProtocolError) + Send + Sync>;

fn create<P: Packet>(buf: &mut Bytes) -> Result<AnyPacket> {
    Ok(Box::new(P::read(buf)?))
}

/// Immutable pairing of a packet ID with the factory for one packet shape
#[derive(Clone, Copy)]
pub struct PacketType {
    id: u32,
    name: &'static str,
    factory: Factory,
}

impl PacketType {
    pub fn of<P: Packet>() -> Self {
        Self {
            id: P::ID,
            name: packet_name::<P>(),
            factory: create::<P>,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decode a packet body with this type's factory
    pub fn create(&self, buf: &mut Bytes) -> Result<AnyPacket> {
        (self.factory)(buf)
    }
}

impl fmt::Debug for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketType")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

struct Entry<C> {
    packet_type: PacketType,
    handler: Option<Handler<C>>,
}

impl<C> Clone for Entry<C> {
    fn clone(&self) -> Self {
        Self {
            packet_type: self.packet_type,
            handler: self.handler.clone(),
        }
    }
}

/// Result of a successful dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    pub id: u32,
    pub packet: &'static str,
    pub handled: bool,
}

/// Accumulates packet registrations for one connection state
pub struct PacketRegistryBuilder<C> {
    name: &'static str,
    entries: BTreeMap<u32, Entry<C>>,
    on_attach: Option<Hook<C>>,
    on_detach: Option<Hook<C>>,
    on_exception: Option<ExceptionHook<C>>,
}

impl<C: 'static> PacketRegistryBuilder<C> {
    /// Create an empty builder. `name` identifies the registry in errors and logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: BTreeMap::new(),
            on_attach: None,
            on_detach: None,
            on_exception: None,
        }
    }

    /// Register a packet type without a handler.
    ///
    /// Packets of this type are decoded and then dropped. Replaces any
    /// previous registration with the same ID.
    pub fn add_packet<P: Packet>(mut self) -> Self {
        self.insert(PacketType::of::<P>(), None);
        self
    }

    /// Register a packet type with a handler.
    ///
    /// Replaces any previous registration with the same ID.
    pub fn add_packet_with<P, F>(mut self, handler: F) -> Self
    where
        P: Packet,
        F: Fn(&mut C, P) -> Result<()> + Send + Sync + 'static,
    {
        let handler: Handler<C> = Arc::new(move |ctx: &mut C, packet: AnyPacket| {
            let packet = packet.downcast::<P>().map_err(|_| {
                ProtocolError::InvalidData(format!(
                    "factory produced the wrong type for {}",
                    packet_name::<P>()
                ))
            })?;
            handler(ctx, *packet)
        });
        self.insert(PacketType::of::<P>(), Some(handler));
        self
    }

    fn insert(&mut self, packet_type: PacketType, handler: Option<Handler<C>>) {
        if let Some(previous) = self.entries.get(&packet_type.id) {
            tracing::debug!(
                "{}: packet 0x{:02x} {} replaces {}",
                self.name,
                packet_type.id,
                packet_type.name,
                previous.packet_type.name
            );
        }
        self.entries.insert(
            packet_type.id,
            Entry {
                packet_type,
                handler,
            },
        );
    }

    /// Remove the registration for `id`, if any.
    pub fn remove_packet(mut self, id: u32) -> Self {
        self.entries.remove(&id);
        self
    }

    /// Remove every registration matching `predicate`.
    pub fn remove_only<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PacketType) -> bool,
    {
        self.entries.retain(|_, entry| !predicate(&entry.packet_type));
        self
    }

    /// Keep only the registrations matching `predicate`.
    pub fn retain_only<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PacketType) -> bool,
    {
        self.entries.retain(|_, entry| predicate(&entry.packet_type));
        self
    }

    /// Called when a connection switches to this registry
    pub fn on_attach<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut C) + Send + Sync + 'static,
    {
        self.on_attach = Some(Arc::new(hook));
        self
    }

    /// Called when a connection leaves this registry or disconnects
    pub fn on_detach<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut C) + Send + Sync + 'static,
    {
        self.on_detach = Some(Arc::new(hook));
        self
    }

    /// Called with any error raised while this registry is active
    pub fn on_exception<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut C, &ProtocolError) + Send + Sync + 'static,
    {
        self.on_exception = Some(Arc::new(hook));
        self
    }

    /// Freeze into a dense ID-indexed registry
    pub fn build(self) -> PacketRegistry<C> {
        let size = self
            .entries
            .keys()
            .next_back()
            .map_or(0, |max| *max as usize + 1);

        let mut entries: Vec<Option<Entry<C>>> = vec![None; size];
        let len = self.entries.len();
        for (id, entry) in self.entries {
            entries[id as usize] = Some(entry);
        }

        tracing::debug!("Built {} registry: {} packet types, table size {}", self.name, len, size);

        PacketRegistry {
            name: self.name,
            entries,
            len,
            on_attach: self.on_attach,
            on_detach: self.on_detach,
            on_exception: self.on_exception,
        }
    }
}

/// Frozen packet lookup table for one connection state
pub struct PacketRegistry<C> {
    name: &'static str,
    entries: Vec<Option<Entry<C>>>,
    len: usize,
    on_attach: Option<Hook<C>>,
    on_detach: Option<Hook<C>>,
    on_exception: Option<ExceptionHook<C>>,
}

impl<C> fmt::Debug for PacketRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketRegistry")
            .field("name", &self.name)
            .field(
                "packets",
                &self.entries.iter().flatten().map(|e| e.packet_type).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<C: 'static> PacketRegistry<C> {
    pub fn builder(name: &'static str) -> PacketRegistryBuilder<C> {
        PacketRegistryBuilder::new(name)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of registered packet types
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn entry(&self, id: u32) -> Option<&Entry<C>> {
        self.entries.get(id as usize).and_then(Option::as_ref)
    }

    pub fn packet_type(&self, id: u32) -> Option<&PacketType> {
        self.entry(id).map(|e| &e.packet_type)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entry(id).is_some()
    }

    pub fn has_handler(&self, id: u32) -> bool {
        self.entry(id).is_some_and(|e| e.handler.is_some())
    }

    /// Decode one packet payload and run its handler
    ///
    /// # Arguments
    /// * `ctx` - The connection context passed to the handler
    /// * `payload` - A frame payload: packet ID followed by the body
    ///
    /// # Errors
    /// - `UnknownPacketId` if nothing is registered for the ID
    /// - Any decode error from the packet body
    /// - `TrailingBytes` if the body decoder left bytes unread
    /// - `Handler` wrapping whatever the handler returned
    pub fn dispatch(&self, ctx: &mut C, mut payload: Bytes) -> Result<Dispatched> {
        let id = read_var_u32(&mut payload)?;

        let entry = self.entry(id).ok_or(ProtocolError::UnknownPacketId {
            state: self.name,
            id,
        })?;
        let name = entry.packet_type.name;

        let packet = entry.packet_type.create(&mut payload)?;
        if payload.has_remaining() {
            return Err(ProtocolError::TrailingBytes {
                packet: name,
                remaining: payload.remaining(),
            });
        }

        let handled = match &entry.handler {
            Some(handler) => {
                handler(ctx, packet).map_err(|e| ProtocolError::handler(name, e))?;
                true
            }
            None => {
                tracing::trace!("{}: no handler for {}, dropped", self.name, name);
                false
            }
        };

        Ok(Dispatched {
            id,
            packet: name,
            handled,
        })
    }

    pub fn attach(&self, ctx: &mut C) {
        if let Some(hook) = &self.on_attach {
            hook(ctx);
        }
    }

    pub fn detach(&self, ctx: &mut C) {
        if let Some(hook) = &self.on_detach {
            hook(ctx);
        }
    }

    /// Report an error to the exception hook, if one is registered
    pub fn exception_caught(&self, ctx: &mut C, error: &ProtocolError) {
        if let Some(hook) = &self.on_exception {
            hook(ctx, error);
        }
    }
}
