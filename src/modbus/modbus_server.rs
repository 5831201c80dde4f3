// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated SHT20 Modbus server
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//!
//! ## Register Map
//!
//! The measurement block starts at the configured address. With the default
//! [`RegisterLayout`] and start address 0:
//!
//! | Register Address | Description | Unit | Scaling |
//! |-----------------|-------------|------|---------|
//! | 0 | Temperature (signed) | °C | ×10 (0.1 °C resolution) |
//! | 1 | Relative humidity | %RH | ×10 (0.1 %RH resolution) |
//!
//! The block answers both Read Holding Registers (0x03) and Read Input
//! Registers (0x04). Write Single Register (0x06) and Write Multiple
//! Registers (0x10) overwrite values inside the block, which lets a test
//! force out-of-range readings.

use std::{
    collections::HashMap,
    future, io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use chrono::Utc;
use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio::time;
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use crate::acquisition::decoder::{encode_sensor, DecodeError};
use crate::acquisition::synthetic::SyntheticSensorGenerator;
use crate::config::RegisterLayout;

/// Modbus TCP server exposing simulated SHT20 measurements
///
/// Clones share the same register map, so one instance can be handed to
/// every client connection while an updater task moves the values.
#[derive(Debug, Clone)]
pub struct Sht20ModbusServer {
    start_address: u16,
    layout: RegisterLayout,
    registers: Arc<Mutex<HashMap<u16, u16>>>,
}

fn lock(registers: &Mutex<HashMap<u16, u16>>) -> MutexGuard<'_, HashMap<u16, u16>> {
    registers.lock().unwrap_or_else(PoisonError::into_inner)
}

impl tokio_modbus::server::Service for Sht20ModbusServer {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Simulator received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadHoldingRegisters(addr, cnt) => {
                register_read(&lock(&self.registers), addr, cnt).map(Response::ReadHoldingRegisters)
            }
            Request::ReadInputRegisters(addr, cnt) => {
                register_read(&lock(&self.registers), addr, cnt).map(Response::ReadInputRegisters)
            }
            Request::WriteMultipleRegisters(addr, values) => {
                register_write(&mut lock(&self.registers), addr, &values)
                    .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            Request::WriteSingleRegister(addr, value) => register_write(
                &mut lock(&self.registers),
                addr,
                std::slice::from_ref(&value),
            )
            .map(|_| Response::WriteSingleRegister(addr, value)),
            _ => {
                error!("SERVER: Exception::IllegalFunction - Unimplemented function code in request: {req:?}");
                Err(ExceptionCode::IllegalFunction)
            }
        };
        future::ready(res)
    }
}

impl Sht20ModbusServer {
    /// Create a server whose measurement block starts at `start_address`
    ///
    /// All registers read zero until [`Self::set_reading`] is called.
    pub fn new(start_address: u16, layout: RegisterLayout) -> Self {
        let registers = (0..layout.register_count)
            .filter_map(|offset| start_address.checked_add(offset))
            .map(|addr| (addr, 0u16))
            .collect();
        Self {
            start_address,
            layout,
            registers: Arc::new(Mutex::new(registers)),
        }
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    /// Publish a new measurement in the register block
    pub fn set_reading(&self, temperature: f64, humidity: f64) -> Result<(), DecodeError> {
        let words = encode_sensor(temperature, humidity, &self.layout)?;
        let mut registers = lock(&self.registers);
        for (offset, word) in words.into_iter().enumerate() {
            if let Some(addr) = self.start_address.checked_add(offset as u16) {
                registers.insert(addr, word);
            }
        }
        Ok(())
    }

    /// Current content of the measurement block
    pub fn registers(&self) -> Vec<u16> {
        let registers = lock(&self.registers);
        (0..self.layout.register_count)
            .filter_map(|offset| self.start_address.checked_add(offset))
            .map(|addr| registers.get(&addr).copied().unwrap_or(0))
            .collect()
    }
}

/// Helper function implementing reading registers from a HashMap.
fn register_read(
    registers: &HashMap<u16, u16>,
    addr: u16,
    cnt: u16,
) -> Result<Vec<u16>, ExceptionCode> {
    let mut response_values = vec![0; cnt.into()];
    for i in 0..cnt {
        let value = addr
            .checked_add(i)
            .and_then(|reg_addr| registers.get(&reg_addr));
        match value {
            Some(r) => response_values[i as usize] = *r,
            None => {
                error!("SERVER: Exception::IllegalDataAddress");
                return Err(ExceptionCode::IllegalDataAddress);
            }
        }
    }

    Ok(response_values)
}

/// Write registers inside the block. Used by both the write single register
/// and write multiple registers requests.
fn register_write(
    registers: &mut HashMap<u16, u16>,
    addr: u16,
    values: &[u16],
) -> Result<(), ExceptionCode> {
    // Validate the whole range first so a rejected write changes nothing
    let in_range = (0..values.len()).all(|i| {
        addr.checked_add(i as u16)
            .is_some_and(|reg_addr| registers.contains_key(&reg_addr))
    });
    if !in_range {
        error!("SERVER: Exception::IllegalDataAddress");
        return Err(ExceptionCode::IllegalDataAddress);
    }
    for (i, value) in values.iter().enumerate() {
        registers.insert(addr + i as u16, *value);
    }

    Ok(())
}

/// Accept Modbus TCP clients on `listener` until the task is aborted
pub async fn serve(listener: TcpListener, service: Sht20ModbusServer) -> io::Result<()> {
    let server = Server::new(listener);

    let on_connected = move |stream, socket_addr| {
        let service = service.clone();
        async move {
            debug!("Simulator accepted connection from {}", socket_addr);
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(service.clone()))
            })
        }
    };

    let on_process_error = |err| {
        error!("Modbus simulator error: {err}");
    };

    server.serve(&on_connected, on_process_error).await
}

/// Move the simulated measurement every `period` while `running` is set
pub async fn run_updater(
    service: Sht20ModbusServer,
    mut generator: SyntheticSensorGenerator,
    period: Duration,
    running: Arc<AtomicBool>,
) {
    info!("SHT20 simulator updater started (every {:?})", period);
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    while running.load(Ordering::SeqCst) {
        interval.tick().await;
        let reading = generator.next(None, Utc::now());
        match service.set_reading(reading.temperature, reading.humidity) {
            Ok(()) => debug!(
                "Simulated SHT20: {:.1} °C, {:.1} %RH",
                reading.temperature, reading.humidity
            ),
            Err(err) => error!("Cannot publish simulated reading: {}", err),
        }
    }
}
