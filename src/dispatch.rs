//! Request dispatcher: function-code dispatch over the register store
//!
//! Maps a decoded request PDU to a store operation and builds the reply PDU.
//! Every failure here is per-request: it becomes an exception PDU and the
//! connection stays open. Only the frame layer can kill a connection.
//!
//! Validation order follows the specification: function code first (Illegal
//! Function), then quantity/value fields (Illegal Data Value), then address
//! range against the store (Illegal Data Address).

use tracing::debug;

use crate::constants::{
    COIL_OFF, COIL_ON, FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS,
    FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER, MAX_READ_COILS, MAX_READ_REGISTERS,
    MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};
use crate::error::ExceptionCode;
use crate::pdu::ModbusPdu;
use crate::store::RegisterStore;

/// Dispatch one request PDU against the store, producing the reply PDU.
///
/// Always returns a PDU: a normal reply on success, an exception PDU on any
/// per-request failure.
pub fn dispatch(request: &ModbusPdu, store: &mut RegisterStore) -> ModbusPdu {
    let Some(function) = request.function_code() else {
        // Unreachable behind the frame codec (length >= 2), kept for direct callers
        return ModbusPdu::exception(0, ExceptionCode::IllegalFunction);
    };

    let result = match function {
        FC_READ_COILS | FC_READ_DISCRETE_INPUTS => read_bits(function, request, store),
        FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
            read_registers(function, request, store)
        }
        FC_WRITE_SINGLE_COIL => write_single_coil(request, store),
        FC_WRITE_SINGLE_REGISTER => write_single_register(request, store),
        FC_WRITE_MULTIPLE_COILS => write_multiple_coils(request, store),
        FC_WRITE_MULTIPLE_REGISTERS => write_multiple_registers(request, store),
        _ => {
            debug!("Unsupported function code: 0x{:02X}", function);
            Err(ExceptionCode::IllegalFunction)
        }
    };

    match result {
        Ok(reply) => reply,
        Err(code) => {
            debug!(
                "Request rejected: FC=0x{:02X} ({}) -> {}",
                function,
                ModbusPdu::function_code_description(function),
                code
            );
            ModbusPdu::exception(function, code)
        }
    }
}

/// FC01 / FC02: address(2) + quantity(2)
fn read_bits(
    function: u8,
    request: &ModbusPdu,
    store: &RegisterStore,
) -> Result<ModbusPdu, ExceptionCode> {
    let (address, quantity) = read_request_operands(request)?;

    if quantity == 0 || quantity as usize > MAX_READ_COILS {
        return Err(ExceptionCode::IllegalDataValue);
    }

    let bits = if function == FC_READ_COILS {
        store.read_coils(address, quantity)?
    } else {
        store.read_discrete_inputs(address, quantity)?
    };

    let packed = pack_bits(&bits);
    build_reply(|pdu| {
        pdu.push(function)?;
        pdu.push(packed.len() as u8)?;
        pdu.extend(&packed)
    })
}

/// FC03 / FC04: address(2) + quantity(2)
fn read_registers(
    function: u8,
    request: &ModbusPdu,
    store: &RegisterStore,
) -> Result<ModbusPdu, ExceptionCode> {
    let (address, quantity) = read_request_operands(request)?;

    if quantity == 0 || quantity as usize > MAX_READ_REGISTERS {
        return Err(ExceptionCode::IllegalDataValue);
    }

    let values = if function == FC_READ_HOLDING_REGISTERS {
        store.read_holding_registers(address, quantity)?
    } else {
        store.read_input_registers(address, quantity)?
    };

    build_reply(|pdu| {
        pdu.push(function)?;
        pdu.push((values.len() * 2) as u8)?;
        for value in &values {
            pdu.push_u16(*value)?;
        }
        Ok(())
    })
}

/// FC05: address(2) + value(2), value restricted to 0x0000 / 0xFF00;
/// reply echoes the request
fn write_single_coil(
    request: &ModbusPdu,
    store: &mut RegisterStore,
) -> Result<ModbusPdu, ExceptionCode> {
    let (address, raw) = read_request_operands(request)?;

    let value = match raw {
        COIL_ON => true,
        COIL_OFF => false,
        _ => return Err(ExceptionCode::IllegalDataValue),
    };

    store.write_coil(address, value)?;
    echo_reply(FC_WRITE_SINGLE_COIL, address, raw)
}

/// FC06: address(2) + value(2); reply echoes the request
fn write_single_register(
    request: &ModbusPdu,
    store: &mut RegisterStore,
) -> Result<ModbusPdu, ExceptionCode> {
    let (address, value) = read_request_operands(request)?;
    store.write_register(address, value)?;
    echo_reply(FC_WRITE_SINGLE_REGISTER, address, value)
}

/// FC0F: address(2) + quantity(2) + byte_count(1) + packed bits;
/// byte_count must equal ceil(quantity / 8)
fn write_multiple_coils(
    request: &ModbusPdu,
    store: &mut RegisterStore,
) -> Result<ModbusPdu, ExceptionCode> {
    let (address, quantity, data) = write_request_operands(request)?;

    if quantity == 0 || quantity as usize > MAX_WRITE_COILS {
        return Err(ExceptionCode::IllegalDataValue);
    }
    if data.len() != (quantity as usize).div_ceil(8) {
        return Err(ExceptionCode::IllegalDataValue);
    }

    let values = unpack_bits(data, quantity as usize);
    store.write_coils(address, &values)?;
    echo_reply(FC_WRITE_MULTIPLE_COILS, address, quantity)
}

/// FC10: address(2) + quantity(2) + byte_count(1) + register data;
/// byte_count must equal quantity * 2
fn write_multiple_registers(
    request: &ModbusPdu,
    store: &mut RegisterStore,
) -> Result<ModbusPdu, ExceptionCode> {
    let (address, quantity, data) = write_request_operands(request)?;

    if quantity == 0 || quantity as usize > MAX_WRITE_REGISTERS {
        return Err(ExceptionCode::IllegalDataValue);
    }
    if data.len() != quantity as usize * 2 {
        return Err(ExceptionCode::IllegalDataValue);
    }

    let values: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    store.write_registers(address, &values)?;
    echo_reply(FC_WRITE_MULTIPLE_REGISTERS, address, quantity)
}

// ============================================================================
// Operand parsing
// ============================================================================

/// Fixed 5-byte layout shared by FC01-06: function(1) + address(2) + word(2).
/// Truncated or oversized operand bytes reject the request.
fn read_request_operands(request: &ModbusPdu) -> Result<(u16, u16), ExceptionCode> {
    if request.len() != 5 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    // Lengths are checked, the reads cannot fail
    let address = request.u16_at(1).ok_or(ExceptionCode::IllegalDataValue)?;
    let word = request.u16_at(3).ok_or(ExceptionCode::IllegalDataValue)?;
    Ok((address, word))
}

/// FC0F/FC10 layout: function(1) + address(2) + quantity(2) + byte_count(1) +
/// data. The byte_count field must match the data bytes actually present.
fn write_request_operands(request: &ModbusPdu) -> Result<(u16, u16, &[u8]), ExceptionCode> {
    if request.len() < 6 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let address = request.u16_at(1).ok_or(ExceptionCode::IllegalDataValue)?;
    let quantity = request.u16_at(3).ok_or(ExceptionCode::IllegalDataValue)?;
    let byte_count = request.byte_at(5).ok_or(ExceptionCode::IllegalDataValue)? as usize;

    let data = &request.as_slice()[6..];
    if data.len() != byte_count {
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok((address, quantity, data))
}

// ============================================================================
// Reply building
// ============================================================================

/// Echo-style reply for the write functions: function + two u16 operands
fn echo_reply(function: u8, address: u16, word: u16) -> Result<ModbusPdu, ExceptionCode> {
    build_reply(|pdu| {
        pdu.push(function)?;
        pdu.push_u16(address)?;
        pdu.push_u16(word)
    })
}

/// Run a builder closure over a fresh PDU. Validation bounds every reply well
/// under the PDU cap, so an overflow here is a server-side bug.
fn build_reply<F>(fill: F) -> Result<ModbusPdu, ExceptionCode>
where
    F: FnOnce(&mut ModbusPdu) -> crate::error::ModbusResult<()>,
{
    let mut pdu = ModbusPdu::new();
    match fill(&mut pdu) {
        Ok(()) => Ok(pdu),
        Err(_) => Err(ExceptionCode::ServerDeviceFailure),
    }
}

/// Pack bit values LSB-first into bytes, final byte zero-padded
fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Unpack `count` LSB-first bits from packed bytes
fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes[i / 8] & (1 << (i % 8)) != 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreLayout;

    fn store() -> RegisterStore {
        RegisterStore::new(StoreLayout {
            coils: 16,
            discrete_inputs: 8,
            holding_registers: 10,
            input_registers: 4,
        })
    }

    fn req(bytes: &[u8]) -> ModbusPdu {
        ModbusPdu::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_read_holding_full_space() {
        let mut s = store();
        let reply = dispatch(&req(&[0x03, 0x00, 0x00, 0x00, 0x0A]), &mut s);
        assert!(!reply.is_exception());
        // function + byte count + 10 zero registers
        assert_eq!(reply.len(), 2 + 20);
        assert_eq!(reply.as_slice()[1], 20);
        assert!(reply.as_slice()[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_past_end_is_illegal_address() {
        let mut s = store();
        // 5 + 10 > 10
        let reply = dispatch(&req(&[0x03, 0x00, 0x05, 0x00, 0x0A]), &mut s);
        assert_eq!(reply.as_slice(), &[0x83, 0x02]);
    }

    #[test]
    fn test_read_quantity_out_of_range_is_illegal_value() {
        let mut s = store();
        let zero = dispatch(&req(&[0x03, 0x00, 0x00, 0x00, 0x00]), &mut s);
        assert_eq!(zero.exception_code(), Some(0x03));

        // 126 > 125
        let too_many = dispatch(&req(&[0x04, 0x00, 0x00, 0x00, 0x7E]), &mut s);
        assert_eq!(too_many.exception_code(), Some(0x03));
    }

    #[test]
    fn test_unsupported_function() {
        let mut s = store();
        let reply = dispatch(&req(&[0x2B, 0x0E, 0x01, 0x00]), &mut s);
        assert_eq!(reply.as_slice(), &[0xAB, 0x01]);
    }

    #[test]
    fn test_write_single_register_echo_and_effect() {
        let mut s = store();
        let reply = dispatch(&req(&[0x06, 0x00, 0x03, 0x12, 0x34]), &mut s);
        assert_eq!(reply.as_slice(), &[0x06, 0x00, 0x03, 0x12, 0x34]);

        let read = dispatch(&req(&[0x03, 0x00, 0x03, 0x00, 0x01]), &mut s);
        assert_eq!(read.as_slice(), &[0x03, 0x02, 0x12, 0x34]);
    }

    #[test]
    fn test_write_single_coil_value_validation() {
        let mut s = store();
        let on = dispatch(&req(&[0x05, 0x00, 0x02, 0xFF, 0x00]), &mut s);
        assert_eq!(on.as_slice(), &[0x05, 0x00, 0x02, 0xFF, 0x00]);
        assert_eq!(s.read_coils(2, 1).unwrap(), vec![true]);

        // Anything but 0x0000/0xFF00 is rejected
        let bad = dispatch(&req(&[0x05, 0x00, 0x02, 0x00, 0x01]), &mut s);
        assert_eq!(bad.as_slice(), &[0x85, 0x03]);
        // and the coil is untouched
        assert_eq!(s.read_coils(2, 1).unwrap(), vec![true]);
    }

    #[test]
    fn test_read_coils_bit_packing() {
        let mut s = store();
        s.write_coil(0, true).unwrap();
        s.write_coil(2, true).unwrap();
        s.write_coil(8, true).unwrap();

        let reply = dispatch(&req(&[0x01, 0x00, 0x00, 0x00, 0x0A]), &mut s);
        // 10 coils -> 2 bytes, LSB first: 0b0000_0101, 0b0000_0001
        assert_eq!(reply.as_slice(), &[0x01, 0x02, 0x05, 0x01]);
    }

    #[test]
    fn test_read_discrete_inputs() {
        let mut s = store();
        s.set_discrete_input(1, true).unwrap();
        let reply = dispatch(&req(&[0x02, 0x00, 0x00, 0x00, 0x08]), &mut s);
        assert_eq!(reply.as_slice(), &[0x02, 0x01, 0x02]);
    }

    #[test]
    fn test_write_multiple_registers() {
        let mut s = store();
        let reply = dispatch(
            &req(&[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]),
            &mut s,
        );
        assert_eq!(reply.as_slice(), &[0x10, 0x00, 0x01, 0x00, 0x02]);
        assert_eq!(
            s.read_holding_registers(1, 2).unwrap(),
            vec![0x000A, 0x0102]
        );
    }

    #[test]
    fn test_write_multiple_registers_byte_count_mismatch() {
        let mut s = store();
        // byte_count says 4, quantity says 3 registers
        let reply = dispatch(
            &req(&[0x10, 0x00, 0x01, 0x00, 0x03, 0x04, 0x00, 0x0A, 0x01, 0x02]),
            &mut s,
        );
        assert_eq!(reply.as_slice(), &[0x90, 0x03]);
    }

    #[test]
    fn test_write_multiple_coils() {
        let mut s = store();
        // 10 coils: 0b1100_1101, 0b0000_0010 -> pattern below
        let reply = dispatch(
            &req(&[0x0F, 0x00, 0x00, 0x00, 0x0A, 0x02, 0xCD, 0x02]),
            &mut s,
        );
        assert_eq!(reply.as_slice(), &[0x0F, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(
            s.read_coils(0, 10).unwrap(),
            vec![true, false, true, true, false, false, true, true, false, true]
        );
    }

    #[test]
    fn test_write_multiple_coils_byte_count_mismatch() {
        let mut s = store();
        // 10 coils need 2 data bytes, only 1 supplied
        let reply = dispatch(&req(&[0x0F, 0x00, 0x00, 0x00, 0x0A, 0x01, 0xCD]), &mut s);
        assert_eq!(reply.as_slice(), &[0x8F, 0x03]);
    }

    #[test]
    fn test_write_straddling_end_leaves_store_untouched() {
        let mut s = store();
        let reply = dispatch(
            &req(&[0x10, 0x00, 0x08, 0x00, 0x03, 0x06, 0, 1, 0, 2, 0, 3]),
            &mut s,
        );
        assert_eq!(reply.as_slice(), &[0x90, 0x02]);
        assert_eq!(s.read_holding_registers(8, 2).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_truncated_operands_are_illegal_value() {
        let mut s = store();
        let reply = dispatch(&req(&[0x03, 0x00, 0x00, 0x00]), &mut s);
        assert_eq!(reply.as_slice(), &[0x83, 0x03]);
    }

    #[test]
    fn test_bit_round_trip() {
        let bits = vec![true, false, true, true, false, false, true, true, false, true];
        assert_eq!(unpack_bits(&pack_bits(&bits), bits.len()), bits);
    }
}
