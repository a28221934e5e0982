//! Semantic checks of generated Modbus requests. A frame passes only if a compliant
//! server would be expected to execute it, so with validation enabled the fuzzer
//! exercises the request handlers instead of the frame parser.

use super::adu::{MBAP_LEN, SerialAdu, TcpAdu};
use super::messages;
use fieldfuzz_core::codec::{CodecError, Record};
use fieldfuzz_core::traits::TransportKind;

const MAX_PDU_LEN: usize = 253;
const ADDRESS_SPACE: u64 = 0x10000;

const SERIAL_FUNCTION_CODES: &[u8] = &[
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x0B, 0x0C, 0x0F, 0x10, 0x11, 0x14, 0x15,
    0x16, 0x17, 0x18,
];
const TCP_FUNCTION_CODES: &[u8] = &[
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x0F, 0x10, 0x14, 0x15, 0x16, 0x17, 0x18,
];

const DIAGNOSTIC_SUB_FUNCTIONS: &[u64] = &[
    0x00, 0x01, 0x02, 0x03, 0x04, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11, 0x12, 0x14,
];

#[derive(Debug)]
enum Violation {
    Rule(&'static str),
    Malformed(CodecError),
}

impl From<CodecError> for Violation {
    fn from(err: CodecError) -> Self {
        Violation::Malformed(err)
    }
}

type Check = Result<(), Violation>;

fn ensure(condition: bool, rule: &'static str) -> Check {
    if condition {
        Ok(())
    } else {
        Err(Violation::Rule(rule))
    }
}

fn count(items: &[Record]) -> u64 {
    items.len() as u64
}

/// True if `frame` is a well-formed request a server should execute
#[must_use]
pub fn validate(frame: &[u8], transport: TransportKind) -> bool {
    match check_frame(frame, transport) {
        Ok(()) => true,
        Err(violation) => {
            tracing::trace!("rejected frame: {violation:?}");
            false
        }
    }
}

fn check_frame(frame: &[u8], transport: TransportKind) -> Check {
    let (pdu, allowed) = match transport {
        TransportKind::Serial => {
            ensure(frame.len() > 3, "serial frame too short")?;
            let adu = SerialAdu::parse(frame).ok_or(Violation::Rule("serial frame too short"))?;
            (adu.pdu, SERIAL_FUNCTION_CODES)
        }
        TransportKind::Socket => {
            ensure(frame.len() > MBAP_LEN, "tcp frame too short")?;
            let adu = TcpAdu::parse(frame).ok_or(Violation::Rule("tcp frame too short"))?;
            ensure(adu.protocol_id == 0, "protocol identifier is not modbus")?;
            ensure(
                adu.pdu.len() + 1 == usize::from(adu.length),
                "length field does not match the pdu",
            )?;
            (adu.pdu, TCP_FUNCTION_CODES)
        }
    };
    ensure(pdu.len() <= MAX_PDU_LEN, "pdu longer than 253 bytes")?;

    let code = pdu.first().copied().ok_or(Violation::Rule("empty pdu"))?;
    ensure(allowed.contains(&code), "function code not valid for transport")?;
    let layout =
        messages::by_function_code(code).ok_or(Violation::Rule("unknown function code"))?;
    let request = layout.decode(pdu)?;
    check_request(code, &request)
}

fn check_request(code: u8, r: &Record) -> Check {
    match code {
        0x01 | 0x02 => check_read(r, 0x7D0),
        0x03 | 0x04 => check_read(r, 0x7D),
        0x05 => ensure(
            matches!(r.uint("output_value")?, 0x0000 | 0xFF00),
            "coil value must be 0x0000 or 0xFF00",
        ),
        0x08 => check_diagnostics(r),
        0x0F => check_write_coils(r),
        0x10 => check_write_registers(r),
        0x14 => check_read_file_record(r),
        0x15 => check_write_file_record(r),
        0x17 => check_read_write_registers(r),
        _ => Ok(()),
    }
}

fn check_address_range(start: u64, quantity: u64) -> Check {
    ensure(start + quantity <= ADDRESS_SPACE, "address range exceeds 0x10000")
}

fn check_read(r: &Record, max_quantity: u64) -> Check {
    let quantity = r.uint("quantity")?;
    ensure((1..=max_quantity).contains(&quantity), "quantity out of range")?;
    check_address_range(r.uint("start_addr")?, quantity)
}

fn check_diagnostics(r: &Record) -> Check {
    let sub_func = r.uint("sub_func")?;
    ensure(
        DIAGNOSTIC_SUB_FUNCTIONS.contains(&sub_func),
        "unknown diagnostics sub-function",
    )?;
    let data = r
        .list("data")?
        .iter()
        .map(|word| word.uint("value"))
        .collect::<Result<Vec<u64>, _>>()?;
    match sub_func {
        0x00 => Ok(()),
        0x01 => ensure(
            data == [0x0000] || data == [0xFF00],
            "restart option must be 0x0000 or 0xFF00",
        ),
        0x03 => ensure(
            data.len() == 1 && data[0] <= 0xFF00,
            "invalid ASCII delimiter",
        ),
        _ => ensure(data == [0x0000], "sub-function data must be 0x0000"),
    }
}

fn check_write_coils(r: &Record) -> Check {
    let quantity = r.uint("quantity_output")?;
    ensure((1..=0x7B0).contains(&quantity), "quantity out of range")?;
    let byte_count = r.uint("byte_count")?;
    ensure(
        byte_count == quantity.div_ceil(8),
        "byte count does not match quantity",
    )?;
    ensure(
        count(r.list("outputs_value")?) == byte_count,
        "byte count does not match the values",
    )?;
    check_address_range(r.uint("start_addr")?, quantity)
}

fn check_write_registers(r: &Record) -> Check {
    let quantity = r.uint("quantity_registers")?;
    ensure((1..=0x7B).contains(&quantity), "quantity out of range")?;
    ensure(
        r.uint("byte_count")? == 2 * quantity,
        "byte count does not match quantity",
    )?;
    ensure(
        count(r.list("outputs_value")?) == quantity,
        "quantity does not match the values",
    )?;
    check_address_range(r.uint("start_addr")?, quantity)
}

fn check_file_sub_request(sub: &Record) -> Check {
    ensure(sub.uint("ref_type")? == 6, "reference type must be 6")?;
    ensure(sub.uint("file_number")? > 0, "file number must not be 0")?;
    let record_number = sub.uint("record_number")?;
    ensure(record_number <= 0x270F, "record number out of range")?;
    ensure(
        record_number + sub.uint("record_length")? <= 0x2710,
        "record range exceeds 0x2710",
    )
}

fn check_read_file_record(r: &Record) -> Check {
    let byte_count = r.uint("byte_count")?;
    ensure(
        byte_count > 6 && byte_count <= 0xF5,
        "byte count out of range",
    )?;
    ensure(byte_count % 7 == 0, "byte count is not a multiple of 7")?;
    let sub_requests = r.list("sub_requests")?;
    ensure(
        7 * count(sub_requests) == byte_count,
        "byte count does not match the sub-requests",
    )?;
    let mut response_len = 2;
    for sub in sub_requests {
        check_file_sub_request(sub)?;
        response_len += 2 * sub.uint("record_length")? + 2;
    }
    ensure(
        response_len <= MAX_PDU_LEN as u64,
        "response would exceed 253 bytes",
    )
}

fn check_write_file_record(r: &Record) -> Check {
    let data_length = r.uint("data_length")?;
    ensure(
        data_length > 8 && data_length <= 0xFB,
        "data length out of range",
    )?;
    for sub in r.list("sub_requests")? {
        check_file_sub_request(sub)?;
        ensure(
            count(sub.list("record_data")?) == sub.uint("record_length")?,
            "record length does not match the record data",
        )?;
    }
    Ok(())
}

fn check_read_write_registers(r: &Record) -> Check {
    let read_quantity = r.uint("read_quantity_registers")?;
    ensure((1..=0x7D).contains(&read_quantity), "read quantity out of range")?;
    check_address_range(r.uint("read_starting_addr")?, read_quantity)?;
    let write_quantity = r.uint("write_quantity_registers")?;
    ensure(
        (1..=0x79).contains(&write_quantity),
        "write quantity out of range",
    )?;
    check_address_range(r.uint("write_starting_addr")?, write_quantity)?;
    let byte_count = r.uint("byte_count")?;
    ensure(
        byte_count == 2 * write_quantity,
        "byte count does not match write quantity",
    )?;
    ensure(
        2 * count(r.list("write_registers_value")?) == byte_count,
        "byte count does not match the values",
    )
}
