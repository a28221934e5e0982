use fieldfuzz_core::codec::{Field, FieldKind, Layout, Policy, Unit};

/// Request and exception function codes defined by the Modbus application protocol
pub const VALID_FUNCTION_CODES: &[u64] = &[
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x0B, 0x0C, 0x0F, 0x10, 0x11, 0x14, 0x15,
    0x16, 0x17, 0x18, 0x2B, // requests
    0x81, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x8B, 0x8C, 0x8F, 0x90, 0x91, 0x94, 0x95,
    0x96, 0x97, 0x98, 0xAB, // exceptions
];

/// Function codes only meaningful on a serial line
pub const SERIAL_ONLY_FUNCTION_CODES: &[u8] = &[0x07, 0x08, 0x0B, 0x0C, 0x11];

/// Name of the message with a random, undefined function code
pub const INVALID_FUNCTION_CODE: &str = "Invalid function code";

const WORD: &[Field] = &[Field::uint("value", 16)];
const BYTE: &[Field] = &[Field::uint("value", 8)];

const READ_FILE_SUB_REQUEST: &[Field] = &[
    Field::uint_default("ref_type", 8, 6),
    Field::uint_default("file_number", 16, 1),
    Field::uint("record_number", 16),
    Field::uint_default("record_length", 16, 1),
];

const WRITE_FILE_SUB_REQUEST: &[Field] = &[
    Field::uint_default("ref_type", 8, 6),
    Field::uint_default("file_number", 16, 1),
    Field::uint("record_number", 16),
    Field::length_of("record_length", 16, "record_data", Unit::Elements),
    Field::list("record_data", WORD, 1, 8),
];

/// Every request message, indexed by its name
pub static MESSAGES: &[Layout] = &[
    Layout {
        name: "Read Coils Request",
        fields: &[
            Field::fixed("func_code", 8, 0x01),
            Field::uint("start_addr", 16),
            Field::uint_default("quantity", 16, 1),
        ],
    },
    Layout {
        name: "Read Discrete Inputs",
        fields: &[
            Field::fixed("func_code", 8, 0x02),
            Field::uint("start_addr", 16),
            Field::uint_default("quantity", 16, 1),
        ],
    },
    Layout {
        name: "Read Holding Registers",
        fields: &[
            Field::fixed("func_code", 8, 0x03),
            Field::uint("start_addr", 16),
            Field::uint_default("quantity", 16, 1),
        ],
    },
    Layout {
        name: "Read Input Registers",
        fields: &[
            Field::fixed("func_code", 8, 0x04),
            Field::uint("start_addr", 16),
            Field::uint_default("quantity", 16, 1),
        ],
    },
    Layout {
        name: "Write Single Coil",
        fields: &[
            Field::fixed("func_code", 8, 0x05),
            Field::uint("output_addr", 16),
            Field::uint("output_value", 16),
        ],
    },
    Layout {
        name: "Write Single Register",
        fields: &[
            Field::fixed("func_code", 8, 0x06),
            Field::uint("register_addr", 16),
            Field::uint("register_value", 16),
        ],
    },
    Layout {
        name: "Read Exception Status",
        fields: &[Field::fixed("func_code", 8, 0x07)],
    },
    Layout {
        name: "Diagnostics",
        fields: &[
            Field::fixed("func_code", 8, 0x08),
            Field::uint("sub_func", 16),
            Field::list("data", WORD, 1, 4),
        ],
    },
    Layout {
        name: "Get Comm Event Counter",
        fields: &[Field::fixed("func_code", 8, 0x0B)],
    },
    Layout {
        name: "Get Comm Event Log",
        fields: &[Field::fixed("func_code", 8, 0x0C)],
    },
    Layout {
        name: "Write Multiple Coils",
        fields: &[
            Field::fixed("func_code", 8, 0x0F),
            Field::uint("start_addr", 16),
            Field::uint_default("quantity_output", 16, 1),
            Field::length_of("byte_count", 8, "outputs_value", Unit::Bytes),
            Field::list("outputs_value", BYTE, 1, 128),
        ],
    },
    Layout {
        name: "Write Multiple Registers",
        fields: &[
            Field::fixed("func_code", 8, 0x10),
            Field::uint("start_addr", 16),
            Field::length_of("quantity_registers", 16, "outputs_value", Unit::Elements),
            Field::length_of("byte_count", 8, "outputs_value", Unit::Bytes),
            Field::list("outputs_value", WORD, 1, 128),
        ],
    },
    Layout {
        name: "Report Slave Id",
        fields: &[Field::fixed("func_code", 8, 0x11)],
    },
    Layout {
        name: "Read File Record",
        fields: &[
            Field::fixed("func_code", 8, 0x14),
            Field::length_of("byte_count", 8, "sub_requests", Unit::Bytes),
            Field::list("sub_requests", READ_FILE_SUB_REQUEST, 1, 35),
        ],
    },
    Layout {
        name: "Write File Record",
        fields: &[
            Field::fixed("func_code", 8, 0x15),
            Field::length_of("data_length", 8, "sub_requests", Unit::Bytes),
            Field::list("sub_requests", WRITE_FILE_SUB_REQUEST, 1, 16),
        ],
    },
    Layout {
        name: "Mask Write Register",
        fields: &[
            Field::fixed("func_code", 8, 0x16),
            Field::uint("ref_addr", 16),
            Field::uint_default("and_mask", 16, 0xFFFF),
            Field::uint("or_mask", 16),
        ],
    },
    Layout {
        name: "Read Write Multiple Registers",
        fields: &[
            Field::fixed("func_code", 8, 0x17),
            Field::uint("read_starting_addr", 16),
            Field::uint_default("read_quantity_registers", 16, 1),
            Field::uint("write_starting_addr", 16),
            Field::length_of(
                "write_quantity_registers",
                16,
                "write_registers_value",
                Unit::Elements,
            ),
            Field::length_of("byte_count", 8, "write_registers_value", Unit::Bytes),
            Field::list("write_registers_value", WORD, 1, 128),
        ],
    },
    Layout {
        name: "Read FIFO Queue",
        fields: &[
            Field::fixed("func_code", 8, 0x18),
            Field::uint("fifo_pointer_addr", 16),
        ],
    },
    Layout {
        name: INVALID_FUNCTION_CODE,
        fields: &[
            Field::none_of("func_code", 8, VALID_FUNCTION_CODES),
            Field::list("data", BYTE, 0, 252),
        ],
    },
];

/// Layout registered under `name`
#[must_use]
pub fn by_name(name: &str) -> Option<&'static Layout> {
    MESSAGES.iter().find(|layout| layout.name == name)
}

/// Function code of a request layout, `None` for the invalid function code message
#[must_use]
pub fn function_code(layout: &Layout) -> Option<u8> {
    layout.fields.first().and_then(|field| match field.kind {
        FieldKind::Uint {
            policy: Policy::Fixed(code),
            ..
        } => u8::try_from(code).ok(),
        _ => None,
    })
}

/// Request layout with function code `code`
#[must_use]
pub fn by_function_code(code: u8) -> Option<&'static Layout> {
    MESSAGES
        .iter()
        .find(|layout| function_code(layout) == Some(code))
}
