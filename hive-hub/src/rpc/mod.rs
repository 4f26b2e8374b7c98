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


//! RPC envelope: typed requests and responses correlated by id, a JSON wire codec, and the
//! server and client ends that carry them between processes.

mod action;
mod client;
mod envelope;
mod server;

pub use action::Action;
pub use client::{LocalRpcClient, RpcClient};
pub use envelope::{
    decode_request, decode_response, encode_request, encode_response, ErrorBody, Request,
    RequestBody, Response, ResponseBody,
};
pub use server::{RpcEvents, RpcServer};
