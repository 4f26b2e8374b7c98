/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/


mod config;
mod connection;

use crate::config::Config;
use clap::Parser;
use hive_hub::{HiveHub, HubError};
use hive_memory_store::{InMemoryMessageStore, StaticAccessControl};
use std::fs;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command()]
struct ServerArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
}

fn load_config(path: &str) -> Result<Config, HubError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| HubError::upstream(format!("Unable to read config file {path}"), e))?;
    json5::from_str(&contents)
        .map_err(|e| HubError::validation(format!("Unable to parse config file: {e}")))
}

#[tokio::main]
async fn main() -> Result<(), HubError> {
    let _ = tracing_subscriber::fmt::try_init();

    info!("Started hive-hub-server");

    let args = ServerArgs::parse();
    let config = load_config(&args.config)?;

    let access = StaticAccessControl::from_file(&config.access_control.file_path)?;
    let hub = HiveHub::new(
        Arc::new(InMemoryMessageStore::new()),
        Arc::new(access),
        config.hub,
    )?;

    let listener = TcpListener::bind(&config.listener.address)
        .await
        .map_err(|e| HubError::upstream(format!("Unable to bind {}", config.listener.address), e))?;
    info!(address = %config.listener.address, "Listening for duplex sessions");

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(connection::serve(hub.clone(), stream, peer));
            }
            Err(e) => warn!(err = %e, "Failed to accept connection"),
        }
    }
}
