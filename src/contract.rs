//! Tip jar contract interface
//!
//! The ABI and address are deployment specific and supplied externally. This
//! module only turns `(method, args)` into call data; it knows nothing about
//! what the contract does with it.

use crate::config::ContractConfig;
use crate::{Error, Result};
use alloy::dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, Bytes};
use serde_json::Value;
use std::path::Path;

/// A contract ABI plus (optionally) the address it is deployed at
#[derive(Debug, Clone)]
pub struct ContractInterface {
    abi: JsonAbi,
    address: Option<Address>,
}

impl ContractInterface {
    /// Parse a JSON ABI: either a bare array or a compiler artifact with an `abi` field
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let abi_value = match value {
            Value::Object(mut artifact) => artifact
                .remove("abi")
                .ok_or_else(|| Error::Abi("Artifact has no 'abi' field".to_string()))?,
            other => other,
        };
        let abi: JsonAbi = serde_json::from_value(abi_value)
            .map_err(|e| Error::Abi(format!("Invalid ABI: {}", e)))?;

        Ok(Self { abi, address: None })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    /// Build from config. Both the ABI path and the address must be set, and
    /// the ABI must contain the configured deposit and withdraw methods.
    pub fn from_config(config: &ContractConfig) -> Result<Self> {
        let abi_path = config
            .abi_path
            .as_deref()
            .ok_or_else(|| Error::Config("Contract ABI path not configured".to_string()))?;
        let address = config
            .address
            .ok_or_else(|| Error::Config("Contract address not configured".to_string()))?;

        let interface = Self::from_file(abi_path)?.with_address(address);
        for method in [&config.deposit_method, &config.withdraw_method] {
            if !interface.has_method(method) {
                return Err(Error::Abi(format!(
                    "Configured method '{}' not in {}",
                    method,
                    abi_path.display()
                )));
            }
        }
        tracing::debug!(
            address = %address,
            abi = %abi_path.display(),
            functions = interface.abi.functions.len(),
            "Loaded contract interface"
        );
        Ok(interface)
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.abi.functions.contains_key(name)
    }

    /// Pick the overload of `method` that takes `arity` arguments
    fn function(&self, method: &str, arity: usize) -> Result<&Function> {
        let overloads = self
            .abi
            .function(method)
            .ok_or_else(|| Error::Abi(format!("Method '{}' not in contract ABI", method)))?;

        overloads
            .iter()
            .find(|f| f.inputs.len() == arity)
            .ok_or_else(|| {
                Error::Abi(format!(
                    "Method '{}' has no overload taking {} argument(s)",
                    method, arity
                ))
            })
    }

    /// Encode a call to `method`, coercing each string argument to its ABI type
    pub fn encode_call(&self, method: &str, args: &[String]) -> Result<Bytes> {
        let function = self.function(method, args.len())?;

        let values = function
            .inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let ty: DynSolType = param
                    .resolve()
                    .map_err(|e| Error::Abi(format!("Unsupported type for '{}': {}", param.name, e)))?;
                ty.coerce_str(arg).map_err(|e| {
                    Error::InvalidArgument(format!(
                        "Argument '{}' is not a valid {}: {}",
                        arg,
                        ty.sol_type_name(),
                        e
                    ))
                })
            })
            .collect::<Result<Vec<DynSolValue>>>()?;

        let data = function
            .abi_encode_input(&values)
            .map_err(|e| Error::Abi(format!("Failed to encode {}: {}", method, e)))?;

        tracing::debug!(method, signature = %function.signature(), bytes = data.len(), "Encoded contract call");
        Ok(Bytes::from(data))
    }
}
