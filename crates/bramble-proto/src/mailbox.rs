//! VideoCore property channel constants and buffer helpers.
//!
//! Buffer layout: `[total_size, req_resp, (tag, value_size, value_len,
//! value_words...)*, 0]`, 32-bit little-endian words, 16-byte aligned
//! when it reaches the device page.

/// ARM→VC property channel.
pub const MAILBOX_CHANNEL_PROPERTY_OUT: u32 = 8;
/// VC→ARM property channel.
pub const MAILBOX_CHANNEL_PROPERTY_IN: u32 = 9;

/// Sentinel the gateway returns when the VC never answers.
pub const MAILBOX_ERROR: u32 = 0xFFFF_FFFF;

/// Request header value; the VC rewrites it to 0x8000_0000 on success.
pub const MAILBOX_REQUEST: u32 = 0;
pub const MAILBOX_RESPONSE_OK: u32 = 0x8000_0000;

// Property tags the I/O plane uses.
pub const TAG_GET_POWER_STATE: u32 = 0x0002_0001;
pub const TAG_SET_POWER_STATE: u32 = 0x0002_8001;
pub const TAG_GET_CLOCK_RATE: u32 = 0x0003_0002;

// Power state device ids.
pub const POWER_DEVICE_SD_CARD: u32 = 0x0;
pub const POWER_DEVICE_UART0: u32 = 0x1;
pub const POWER_DEVICE_USB_HCD: u32 = 0x3;

// Set-power-state argument bits.
pub const POWER_STATE_ON: u32 = 1 << 0;
pub const POWER_STATE_WAIT: u32 = 1 << 1;

// Clock ids for TAG_GET_CLOCK_RATE.
pub const CLOCK_EMMC: u32 = 1;
pub const CLOCK_UART: u32 = 2;
pub const CLOCK_ARM: u32 = 3;
pub const CLOCK_CORE: u32 = 4;

/// Builder for single-tag property requests, which is all the SD stack
/// ever issues.
pub fn property_request(tag: u32, value_size: u32, args: &[u32]) -> Vec<u32> {
    // header (2) + tag header (3) + value words + end tag
    let value_words = (value_size as usize).div_ceil(4);
    let total_words = 2 + 3 + value_words + 1;
    let mut buf = vec![0u32; total_words];
    buf[0] = (total_words * 4) as u32;
    buf[1] = MAILBOX_REQUEST;
    buf[2] = tag;
    buf[3] = value_size;
    buf[4] = value_size;
    for (idx, arg) in args.iter().enumerate().take(value_words) {
        buf[5 + idx] = *arg;
    }
    // last word stays 0 as the end tag
    buf
}

/// Value words of the first (and only) tag in a reply buffer.
pub fn property_value(buf: &[u32]) -> Option<&[u32]> {
    if buf.len() < 6 || buf[1] != MAILBOX_RESPONSE_OK {
        return None;
    }
    let value_words = (buf[3] as usize).div_ceil(4);
    buf.get(5..5 + value_words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_rate_request_layout() {
        let buf = property_request(TAG_GET_CLOCK_RATE, 8, &[CLOCK_CORE]);
        assert_eq!(buf.len(), 8);
        assert_eq!(buf[0], 32);
        assert_eq!(buf[1], MAILBOX_REQUEST);
        assert_eq!(buf[2], TAG_GET_CLOCK_RATE);
        assert_eq!(buf[3], 8);
        assert_eq!(buf[5], CLOCK_CORE);
        assert_eq!(buf[7], 0);
    }

    #[test]
    fn property_value_requires_response_flag() {
        let mut buf = property_request(TAG_GET_CLOCK_RATE, 8, &[CLOCK_CORE]);
        assert_eq!(property_value(&buf), None);
        buf[1] = MAILBOX_RESPONSE_OK;
        buf[6] = 250_000_000;
        assert_eq!(property_value(&buf), Some(&[CLOCK_CORE, 250_000_000][..]));
    }
}
