use crate::error::PipelineError;
use ethers::abi::{Abi, AbiParser, Token};
use ethers::types::Bytes;

/// Kernel smart account surface used to forward a call to a module.
pub const KERNEL_ABI: &[&str] = &["function execute(address to, uint256 value, bytes data)"];

/// MultiECDSAValidator owner management.
pub const MULTI_ECDSA_VALIDATOR_ABI: &[&str] = &[
    "function enable(address owner)",
    "function disable(address owner)",
];

/// Parses a human-readable interface description into a read-only descriptor.
pub fn parse_interface(signatures: &[&str]) -> Result<Abi, PipelineError> {
    AbiParser::default()
        .parse(signatures)
        .map_err(|e| PipelineError::AbiEncoding {
            function: signatures.join("; "),
            inner: e.to_string(),
        })
}

/// Encodes a call to `function_name` as `selector ++ abi.encode(args)`.
///
/// Only function entries are searched. Overloads are resolved by argument count and then by
/// the argument types.
pub fn encode(
    interface: &Abi,
    function_name: &str,
    args: &[Token],
) -> Result<Bytes, PipelineError> {
    let candidates = interface
        .functions
        .get(function_name)
        .filter(|fs| !fs.is_empty())
        .ok_or_else(|| PipelineError::UnknownFunction(function_name.to_string()))?;

    let mut last_err = None;
    for function in candidates.iter().filter(|f| f.inputs.len() == args.len()) {
        match function.encode_input(args) {
            Ok(data) => return Ok(Bytes::from(data)),
            Err(e) => last_err = Some(e.to_string()),
        }
    }

    Err(PipelineError::AbiEncoding {
        function: function_name.to_string(),
        inner: last_err.unwrap_or_else(|| format!("no overload takes {} argument(s)", args.len())),
    })
}
