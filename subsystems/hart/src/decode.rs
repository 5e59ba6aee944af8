//! # Instruction Decode
//!
//! Decodes a raw 32-bit RV32I/RV64I(+MAC) word, or a 16-bit compressed
//! word, into an [`Inst`]. The 512-entry opcode/funct3/funct7 dispatch table
//! and the separate compressed dispatch are both realized here as field
//! extraction followed by a `match`, rather than a function-pointer table,
//! so the decoder stays a plain, inlinable data path.

use rvcore_hal::bitops::sign_extend;

use crate::inst::{AluOp, AmoOp, BranchOp, CsrOpKind, Inst, LoadOp, MulDivOp, StoreOp};

fn imm_i(word: u32) -> i64 {
    sign_extend(u64::from(word) >> 20, 12) as i64
}

fn imm_s(word: u32) -> i64 {
    let hi = (word >> 25) & 0x7F;
    let lo = (word >> 7) & 0x1F;
    sign_extend(u64::from((hi << 5) | lo), 12) as i64
}

fn imm_b(word: u32) -> i64 {
    let bit12 = (word >> 31) & 1;
    let bit11 = (word >> 7) & 1;
    let bits10_5 = (word >> 25) & 0x3F;
    let bits4_1 = (word >> 8) & 0xF;
    let raw = (bit12 << 12) | (bit11 << 11) | (bits10_5 << 5) | (bits4_1 << 1);
    sign_extend(u64::from(raw), 13) as i64
}

fn imm_u(word: u32) -> i64 {
    sign_extend(u64::from(word & 0xFFFF_F000), 32) as i64
}

fn imm_j(word: u32) -> i64 {
    let bit20 = (word >> 31) & 1;
    let bits19_12 = (word >> 12) & 0xFF;
    let bit11 = (word >> 20) & 1;
    let bits10_1 = (word >> 21) & 0x3FF;
    let raw = (bit20 << 20) | (bits19_12 << 12) | (bit11 << 11) | (bits10_1 << 1);
    sign_extend(u64::from(raw), 21) as i64
}

fn rd(word: u32) -> u8 {
    ((word >> 7) & 0x1F) as u8
}

fn rs1(word: u32) -> u8 {
    ((word >> 15) & 0x1F) as u8
}

fn rs2(word: u32) -> u8 {
    ((word >> 20) & 0x1F) as u8
}

fn funct3(word: u32) -> u32 {
    (word >> 12) & 0x7
}

fn funct7(word: u32) -> u32 {
    (word >> 25) & 0x7F
}

const OP_ARITH_FLAG: u32 = 0x20;

/// Decode one standard 32-bit instruction word.
#[must_use]
pub fn decode32(word: u32) -> Inst {
    let opcode = word & 0x7F;
    match opcode {
        0x37 => Inst::Lui { rd: rd(word), imm: imm_u(word) },
        0x17 => Inst::Auipc { rd: rd(word), imm: imm_u(word) },
        0x6F => Inst::Jal { rd: rd(word), imm: imm_j(word) },
        0x67 if funct3(word) == 0 => Inst::Jalr { rd: rd(word), rs1: rs1(word), imm: imm_i(word) },
        0x63 => decode_branch(word),
        0x03 => decode_load(word),
        0x23 => decode_store(word),
        0x13 => decode_op_imm(word, false),
        0x1B => decode_op_imm(word, true),
        0x33 => decode_op(word, false),
        0x3B => decode_op(word, true),
        0x0F => Inst::Fence,
        0x73 => decode_system(word),
        0x2F => decode_amo(word),
        _ => Inst::Illegal,
    }
}

fn decode_branch(word: u32) -> Inst {
    let op = match funct3(word) {
        0b000 => BranchOp::Eq,
        0b001 => BranchOp::Ne,
        0b100 => BranchOp::Lt,
        0b101 => BranchOp::Ge,
        0b110 => BranchOp::Ltu,
        0b111 => BranchOp::Geu,
        _ => return Inst::Illegal,
    };
    Inst::Branch { op, rs1: rs1(word), rs2: rs2(word), imm: imm_b(word) }
}

fn decode_load(word: u32) -> Inst {
    let op = match funct3(word) {
        0b000 => LoadOp::Lb,
        0b001 => LoadOp::Lh,
        0b010 => LoadOp::Lw,
        0b011 => LoadOp::Ld,
        0b100 => LoadOp::Lbu,
        0b101 => LoadOp::Lhu,
        0b110 => LoadOp::Lwu,
        _ => return Inst::Illegal,
    };
    Inst::Load { op, rd: rd(word), rs1: rs1(word), imm: imm_i(word) }
}

fn decode_store(word: u32) -> Inst {
    let op = match funct3(word) {
        0b000 => StoreOp::Sb,
        0b001 => StoreOp::Sh,
        0b010 => StoreOp::Sw,
        0b011 => StoreOp::Sd,
        _ => return Inst::Illegal,
    };
    Inst::Store { op, rs1: rs1(word), rs2: rs2(word), imm: imm_s(word) }
}

fn decode_op_imm(word: u32, word32: bool) -> Inst {
    let f3 = funct3(word);
    let imm = imm_i(word);
    let op = match f3 {
        0b000 => AluOp::Add,
        0b010 => AluOp::Slt,
        0b011 => AluOp::Sltu,
        0b100 => AluOp::Xor,
        0b110 => AluOp::Or,
        0b111 => AluOp::And,
        0b001 => AluOp::Sll,
        0b101 => {
            if funct7(word) & OP_ARITH_FLAG != 0 {
                AluOp::Sra
            } else {
                AluOp::Srl
            }
        }
        _ => return Inst::Illegal,
    };
    // OP-IMM-32 only defines ADDIW/SLLIW/SRLIW/SRAIW; SLTI(U)/XORI/ORI/ANDI
    // have no word-sized counterpart.
    if word32 && matches!(op, AluOp::Slt | AluOp::Sltu | AluOp::Xor | AluOp::Or | AluOp::And) {
        return Inst::Illegal;
    }
    // Shift amount is encoded in the low bits of the I-immediate; mask it to
    // a sane width here so execute() need not re-derive shamt vs. word32.
    let imm = match op {
        AluOp::Sll | AluOp::Srl | AluOp::Sra => {
            let mask = if word32 { 0x1F } else { 0x3F };
            imm & mask
        }
        _ => imm,
    };
    Inst::AluImm { op, rd: rd(word), rs1: rs1(word), imm, word: word32 }
}

fn decode_op(word: u32, word32: bool) -> Inst {
    let f3 = funct3(word);
    let f7 = funct7(word);
    if f7 == 0x01 {
        // RV64's *W multiply/divide forms only define MULW/DIVW/DIVUW/REMW/
        // REMUW; MULH/MULHSU/MULHU have no word-sized counterpart.
        if word32 && matches!(f3, 0b001 | 0b010 | 0b011) {
            return Inst::Illegal;
        }
        let op = match f3 {
            0b000 => MulDivOp::Mul,
            0b001 => MulDivOp::Mulh,
            0b010 => MulDivOp::Mulhsu,
            0b011 => MulDivOp::Mulhu,
            0b100 => MulDivOp::Div,
            0b101 => MulDivOp::Divu,
            0b110 => MulDivOp::Rem,
            0b111 => MulDivOp::Remu,
            _ => unreachable!("funct3 is 3 bits"),
        };
        return Inst::MulDiv { op, rd: rd(word), rs1: rs1(word), rs2: rs2(word), word: word32 };
    }
    let op = match f3 {
        0b000 => {
            if f7 & OP_ARITH_FLAG != 0 {
                AluOp::Sub
            } else {
                AluOp::Add
            }
        }
        0b001 => AluOp::Sll,
        0b010 => AluOp::Slt,
        0b011 => AluOp::Sltu,
        0b100 => AluOp::Xor,
        0b101 => {
            if f7 & OP_ARITH_FLAG != 0 {
                AluOp::Sra
            } else {
                AluOp::Srl
            }
        }
        0b110 => AluOp::Or,
        0b111 => AluOp::And,
        _ => unreachable!("funct3 is 3 bits"),
    };
    // RV64's *W forms only ever define ADD/SUB/SLL/SRL/SRA; SLT(U)/XOR/OR/AND
    // are reserved in OP-32 and decode as illegal.
    if word32 && matches!(op, AluOp::Slt | AluOp::Sltu | AluOp::Xor | AluOp::Or | AluOp::And) {
        return Inst::Illegal;
    }
    Inst::AluReg { op, rd: rd(word), rs1: rs1(word), rs2: rs2(word), word: word32 }
}

fn decode_system(word: u32) -> Inst {
    let f3 = funct3(word);
    if f3 == 0 {
        let f7 = funct7(word);
        let r2 = rs2(word);
        return match (f7, r2, rs1(word), rd(word)) {
            (0x00, 0x00, 0, 0) => Inst::Ecall,
            (0x00, 0x01, 0, 0) => Inst::Ebreak,
            (0x18, 0x02, 0, 0) => Inst::Mret,
            (0x08, 0x02, 0, 0) => Inst::Sret,
            (0x08, 0x05, 0, 0) => Inst::Wfi,
            (0x09, _, _, 0) => Inst::SfenceVma { rs1: rs1(word), rs2: r2 },
            _ => Inst::Illegal,
        };
    }
    let csr = (word >> 20) as u16;
    let op = match f3 & 0b011 {
        0b01 => CsrOpKind::Swap,
        0b10 => CsrOpKind::Set,
        0b11 => CsrOpKind::Clear,
        _ => return Inst::Illegal,
    };
    if f3 & 0b100 != 0 {
        Inst::CsrImm { op, rd: rd(word), imm: rs1(word), csr }
    } else {
        Inst::CsrReg { op, rd: rd(word), rs1: rs1(word), csr }
    }
}

fn decode_amo(word: u32) -> Inst {
    let f3 = funct3(word);
    let width = match f3 {
        0b010 => 4u8,
        0b011 => 8u8,
        _ => return Inst::Illegal,
    };
    let funct5 = (word >> 27) & 0x1F;
    let aq = (word >> 26) & 1 != 0;
    let rl = (word >> 25) & 1 != 0;
    let op = match funct5 {
        0b00010 => AmoOp::Lr,
        0b00011 => AmoOp::Sc,
        0b00001 => AmoOp::Swap,
        0b00000 => AmoOp::Add,
        0b00100 => AmoOp::Xor,
        0b01100 => AmoOp::And,
        0b01000 => AmoOp::Or,
        0b10000 => AmoOp::Min,
        0b10100 => AmoOp::Max,
        0b11000 => AmoOp::Minu,
        0b11100 => AmoOp::Maxu,
        _ => return Inst::Illegal,
    };
    if op == AmoOp::Lr && rs2(word) != 0 {
        return Inst::Illegal;
    }
    Inst::Amo { op, width, rd: rd(word), rs1: rs1(word), rs2: rs2(word), aq, rl }
}

// ============================================================================
// Compressed (16-bit) instructions
// ============================================================================

fn creg(bits: u16) -> u8 {
    8 + (bits & 0x7) as u8
}

/// Decode one 16-bit compressed instruction, expanding it to the equivalent
/// base [`Inst`] form; final decoding happens inside each handler rather
/// than here. `word64` selects the RV64C variants of the quadrant-2/0
/// load/store-to-SP and `C.JAL`-vs-`C.ADDIW` opcodes.
#[must_use]
pub fn decode16(half: u16, word64: bool) -> Inst {
    let op = half & 0b11;
    let funct3 = (half >> 13) & 0b111;
    match (op, funct3) {
        // C.ADDI4SPN
        (0b00, 0b000) => {
            let imm = c_addi4spn_imm(half);
            if imm == 0 {
                return Inst::Illegal;
            }
            Inst::AluImm { op: AluOp::Add, rd: creg(half >> 2), rs1: 2, imm: imm as i64, word: false }
        }
        // C.LW
        (0b00, 0b010) => {
            let imm = c_lw_imm(half);
            Inst::Load { op: LoadOp::Lw, rd: creg(half >> 2), rs1: creg(half >> 7), imm: imm as i64 }
        }
        // C.LD (RV64) / C.FLD (unimplemented, FPU optional)
        (0b00, 0b011) if word64 => {
            let imm = c_ld_imm(half);
            Inst::Load { op: LoadOp::Ld, rd: creg(half >> 2), rs1: creg(half >> 7), imm: imm as i64 }
        }
        // C.SW
        (0b00, 0b110) => {
            let imm = c_lw_imm(half);
            Inst::Store { op: StoreOp::Sw, rs1: creg(half >> 7), rs2: creg(half >> 2), imm: imm as i64 }
        }
        // C.SD (RV64)
        (0b00, 0b111) if word64 => {
            let imm = c_ld_imm(half);
            Inst::Store { op: StoreOp::Sd, rs1: creg(half >> 7), rs2: creg(half >> 2), imm: imm as i64 }
        }
        // C.ADDI / C.NOP
        (0b01, 0b000) => {
            let rd = ((half >> 7) & 0x1F) as u8;
            let imm = c_imm6(half);
            Inst::AluImm { op: AluOp::Add, rd, rs1: rd, imm, word: false }
        }
        // C.ADDIW (RV64) / C.JAL (RV32)
        (0b01, 0b001) => {
            if word64 {
                let rd = ((half >> 7) & 0x1F) as u8;
                let imm = c_imm6(half);
                Inst::AluImm { op: AluOp::Add, rd, rs1: rd, imm, word: true }
            } else {
                let imm = c_jump_imm(half);
                Inst::Jal { rd: 1, imm }
            }
        }
        // C.LI
        (0b01, 0b010) => {
            let rd = ((half >> 7) & 0x1F) as u8;
            let imm = c_imm6(half);
            Inst::AluImm { op: AluOp::Add, rd, rs1: 0, imm, word: false }
        }
        // C.ADDI16SP / C.LUI
        (0b01, 0b011) => {
            let rd = ((half >> 7) & 0x1F) as u8;
            if rd == 2 {
                let imm = c_addi16sp_imm(half);
                if imm == 0 {
                    return Inst::Illegal;
                }
                Inst::AluImm { op: AluOp::Add, rd: 2, rs1: 2, imm, word: false }
            } else {
                let imm = c_lui_imm(half);
                if imm == 0 || rd == 0 {
                    return Inst::Illegal;
                }
                Inst::Lui { rd, imm }
            }
        }
        // C.ALU1 group: SRLI/SRAI/ANDI/SUB/XOR/OR/AND/SUBW/ADDW
        (0b01, 0b100) => decode_c_alu1(half, word64),
        // C.J
        (0b01, 0b101) => Inst::Jal { rd: 0, imm: c_jump_imm(half) },
        // C.BEQZ
        (0b01, 0b110) => Inst::Branch { op: BranchOp::Eq, rs1: creg(half >> 7), rs2: 0, imm: c_branch_imm(half) },
        // C.BNEZ
        (0b01, 0b111) => Inst::Branch { op: BranchOp::Ne, rs1: creg(half >> 7), rs2: 0, imm: c_branch_imm(half) },
        // C.SLLI
        (0b10, 0b000) => {
            let rd = ((half >> 7) & 0x1F) as u8;
            if rd == 0 {
                return Inst::Illegal;
            }
            let shamt = c_shamt(half, word64);
            Inst::AluImm { op: AluOp::Sll, rd, rs1: rd, imm: shamt, word: false }
        }
        // C.LWSP
        (0b10, 0b010) => {
            let rd = ((half >> 7) & 0x1F) as u8;
            if rd == 0 {
                return Inst::Illegal;
            }
            Inst::Load { op: LoadOp::Lw, rd, rs1: 2, imm: c_lwsp_imm(half) }
        }
        // C.LDSP (RV64)
        (0b10, 0b011) if word64 => {
            let rd = ((half >> 7) & 0x1F) as u8;
            if rd == 0 {
                return Inst::Illegal;
            }
            Inst::Load { op: LoadOp::Ld, rd, rs1: 2, imm: c_ldsp_imm(half) }
        }
        // C.JR / C.MV / C.JALR / C.ADD / C.EBREAK
        (0b10, 0b100) => decode_c_jr_mv_add(half),
        // C.SWSP
        (0b10, 0b110) => Inst::Store { op: StoreOp::Sw, rs1: 2, rs2: ((half >> 2) & 0x1F) as u8, imm: c_swsp_imm(half) },
        // C.SDSP (RV64)
        (0b10, 0b111) if word64 => Inst::Store { op: StoreOp::Sd, rs1: 2, rs2: ((half >> 2) & 0x1F) as u8, imm: c_sdsp_imm(half) },
        _ => Inst::Illegal,
    }
}

fn c_addi4spn_imm(half: u16) -> u32 {
    let b = half;
    // CIW-type: nzuimm[5:4|9:6|2|3] at bits [12:11|10:7|6|5]
    let imm54 = ((b >> 11) & 0x3) as u32;
    let imm96 = ((b >> 7) & 0xF) as u32;
    let imm2 = ((b >> 6) & 0x1) as u32;
    let imm3 = ((b >> 5) & 0x1) as u32;
    (imm54 << 4) | (imm96 << 6) | (imm2 << 2) | (imm3 << 3)
}

fn c_lw_imm(half: u16) -> u32 {
    // CL-type: imm[5:3] at [12:10], imm[2|6] at [6|5]
    let imm53 = ((half >> 10) & 0x7) as u32;
    let imm6 = ((half >> 5) & 0x1) as u32;
    let imm2 = ((half >> 6) & 0x1) as u32;
    (imm53 << 3) | (imm2 << 2) | (imm6 << 6)
}

fn c_ld_imm(half: u16) -> u32 {
    // CL-type: imm[5:3] at [12:10], imm[7:6] at [6:5]
    let imm53 = ((half >> 10) & 0x7) as u32;
    let imm76 = ((half >> 5) & 0x3) as u32;
    (imm53 << 3) | (imm76 << 6)
}

fn c_imm6(half: u16) -> i64 {
    let hi = ((half >> 12) & 1) as u32;
    let lo = ((half >> 2) & 0x1F) as u32;
    sign_extend(u64::from((hi << 5) | lo), 6) as i64
}

fn c_jump_imm(half: u16) -> i64 {
    // CJ-type: imm[11|4|9:8|10|6|7|3:1|5]
    let b = half;
    let bit11 = ((b >> 12) & 1) as u32;
    let bit4 = ((b >> 11) & 1) as u32;
    let bit9_8 = ((b >> 9) & 0x3) as u32;
    let bit10 = ((b >> 8) & 1) as u32;
    let bit6 = ((b >> 7) & 1) as u32;
    let bit7 = ((b >> 6) & 1) as u32;
    let bit3_1 = ((b >> 3) & 0x7) as u32;
    let bit5 = ((b >> 2) & 1) as u32;
    let raw = (bit11 << 11) | (bit10 << 10) | (bit9_8 << 8) | (bit7 << 7) | (bit6 << 6) | (bit5 << 5) | (bit4 << 4) | (bit3_1 << 1);
    sign_extend(u64::from(raw), 12) as i64
}

fn c_branch_imm(half: u16) -> i64 {
    // CB-type: imm[8|4:3] at [12|11:10], imm[7:6|2:1|5] at [6:5|4:3|2]
    let b = half;
    let bit8 = ((b >> 12) & 1) as u32;
    let bit4_3 = ((b >> 10) & 0x3) as u32;
    let bit7_6 = ((b >> 5) & 0x3) as u32;
    let bit2_1 = ((b >> 3) & 0x3) as u32;
    let bit5 = ((b >> 2) & 1) as u32;
    let raw = (bit8 << 8) | (bit7_6 << 6) | (bit5 << 5) | (bit4_3 << 3) | (bit2_1 << 1);
    sign_extend(u64::from(raw), 9) as i64
}

fn c_addi16sp_imm(half: u16) -> i64 {
    // CI-type: imm[9|4|6|8:7|5] at [12|6|5|4:3|2]
    let b = half;
    let bit9 = ((b >> 12) & 1) as u32;
    let bit4 = ((b >> 6) & 1) as u32;
    let bit6 = ((b >> 5) & 1) as u32;
    let bit8_7 = ((b >> 3) & 0x3) as u32;
    let bit5 = ((b >> 2) & 1) as u32;
    let raw = (bit9 << 9) | (bit8_7 << 7) | (bit6 << 6) | (bit5 << 5) | (bit4 << 4);
    sign_extend(u64::from(raw), 10) as i64
}

fn c_lui_imm(half: u16) -> i64 {
    let hi = ((half >> 12) & 1) as u32;
    let lo = ((half >> 2) & 0x1F) as u32;
    let raw = (hi << 17) | (lo << 12);
    sign_extend(u64::from(raw), 18) as i64
}

fn decode_c_alu1(half: u16, word64: bool) -> Inst {
    let rd = creg(half >> 7);
    let sub_op = (half >> 10) & 0x3;
    match sub_op {
        0b00 => {
            let shamt = c_shamt(half, word64);
            Inst::AluImm { op: AluOp::Srl, rd, rs1: rd, imm: shamt, word: false }
        }
        0b01 => {
            let shamt = c_shamt(half, word64);
            Inst::AluImm { op: AluOp::Sra, rd, rs1: rd, imm: shamt, word: false }
        }
        0b10 => {
            let imm = c_imm6(half);
            Inst::AluImm { op: AluOp::And, rd, rs1: rd, imm, word: false }
        }
        0b11 => {
            let rs2 = creg(half >> 2);
            let word_form = (half >> 12) & 1 != 0;
            let op = match ((half >> 12) & 1, (half >> 5) & 0x3) {
                (0, 0b00) => AluOp::Sub,
                (0, 0b01) => AluOp::Xor,
                (0, 0b10) => AluOp::Or,
                (0, 0b11) => AluOp::And,
                (1, 0b00) => AluOp::Sub,
                (1, 0b01) => AluOp::Add,
                _ => return Inst::Illegal,
            };
            Inst::AluReg { op, rd, rs1: rd, rs2, word: word_form }
        }
        _ => unreachable!("sub_op is 2 bits"),
    }
}

fn c_shamt(half: u16, word64: bool) -> i64 {
    let hi = ((half >> 12) & 1) as u32;
    let lo = ((half >> 2) & 0x1F) as u32;
    let raw = (hi << 5) | lo;
    if word64 {
        raw as i64
    } else {
        (raw & 0x1F) as i64
    }
}

fn c_lwsp_imm(half: u16) -> i64 {
    let b = half;
    let bit5 = ((b >> 12) & 1) as u32;
    let bit4_2 = ((b >> 4) & 0x7) as u32;
    let bit7_6 = ((b >> 2) & 0x3) as u32;
    ((bit7_6 << 6) | (bit5 << 5) | (bit4_2 << 2)) as i64
}

fn c_ldsp_imm(half: u16) -> i64 {
    let b = half;
    let bit5 = ((b >> 12) & 1) as u32;
    let bit4_3 = ((b >> 5) & 0x3) as u32;
    let bit8_6 = ((b >> 2) & 0x7) as u32;
    ((bit8_6 << 6) | (bit5 << 5) | (bit4_3 << 3)) as i64
}

fn c_swsp_imm(half: u16) -> i64 {
    let bit5_2 = ((half >> 9) & 0xF) as u32;
    let bit7_6 = ((half >> 7) & 0x3) as u32;
    ((bit7_6 << 6) | (bit5_2 << 2)) as i64
}

fn c_sdsp_imm(half: u16) -> i64 {
    let bit5_3 = ((half >> 10) & 0x7) as u32;
    let bit8_6 = ((half >> 7) & 0x7) as u32;
    ((bit8_6 << 6) | (bit5_3 << 3)) as i64
}

fn decode_c_jr_mv_add(half: u16) -> Inst {
    let bit12 = (half >> 12) & 1;
    let rd_rs1 = ((half >> 7) & 0x1F) as u8;
    let rs2 = ((half >> 2) & 0x1F) as u8;
    match (bit12, rs2) {
        (0, 0) => {
            if rd_rs1 == 0 {
                Inst::Illegal
            } else {
                Inst::Jalr { rd: 0, rs1: rd_rs1, imm: 0 }
            }
        }
        (0, _) => Inst::AluReg { op: AluOp::Add, rd: rd_rs1, rs1: 0, rs2, word: false },
        (1, 0) => {
            if rd_rs1 == 0 {
                Inst::Ebreak
            } else {
                Inst::Jalr { rd: 1, rs1: rd_rs1, imm: 0 }
            }
        }
        (1, _) => Inst::AluReg { op: AluOp::Add, rd: rd_rs1, rs1: rd_rs1, rs2, word: false },
        _ => Inst::Illegal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_lui() {
        // lui x5, 0x12345
        let word = (0x12345 << 12) | (5 << 7) | 0x37;
        assert_eq!(decode32(word), Inst::Lui { rd: 5, imm: 0x1234_5000 });
    }

    #[test]
    fn decodes_jal_immediate_layout() {
        // Build from the target immediate directly via the imm_j decoder's
        // inverse for a known small offset.
        let imm: i32 = -4; // simplest nonzero negative offset, bit11 set group
        let u = imm as u32 & 0x1F_FFFE; // 21-bit range, bit0 implicit zero
        let bit20 = (u >> 20) & 1;
        let bits10_1 = (u >> 1) & 0x3FF;
        let bit11 = (u >> 11) & 1;
        let bits19_12 = (u >> 12) & 0xFF;
        let word = 0x6F | (1 << 7) | (bits19_12 << 12) | (bit11 << 20) | (bits10_1 << 21) | (bit20 << 31);
        match decode32(word) {
            Inst::Jal { rd, imm: decoded } => {
                assert_eq!(rd, 1);
                assert_eq!(decoded, -4);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn decodes_branch_immediate_layout() {
        // beq x1, x2, -2 (imm[12:1] all encoding negative two)
        let imm: i32 = -2;
        let u = imm as u32 & 0x1FFE;
        let bit12 = (u >> 12) & 1;
        let bit11 = (u >> 11) & 1;
        let bits10_5 = (u >> 5) & 0x3F;
        let bits4_1 = (u >> 1) & 0xF;
        let word = 0x63 | (bit11 << 7) | (bits4_1 << 8) | (2 << 12) | (1 << 15) | (2 << 20) | (bits10_5 << 25) | (bit12 << 31);
        match decode32(word) {
            Inst::Branch { op: BranchOp::Eq, rs1: 1, rs2: 2, imm } => assert_eq!(imm, -2),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn decodes_divu_register_form() {
        // divu x5, x6, x7
        let word = 0x33 | (5 << 7) | (0b101 << 12) | (6 << 15) | (7 << 20) | (0x01 << 25);
        assert_eq!(
            decode32(word),
            Inst::MulDiv { op: MulDivOp::Divu, rd: 5, rs1: 6, rs2: 7, word: false }
        );
    }

    #[test]
    fn decodes_amoadd_w() {
        // amoadd.w x1, x5, (x10)
        let word = 0x2F | (1 << 7) | (0b010 << 12) | (10 << 15) | (5 << 20) | (0b00000 << 27);
        assert_eq!(
            decode32(word),
            Inst::Amo { op: AmoOp::Add, width: 4, rd: 1, rs1: 10, rs2: 5, aq: false, rl: false }
        );
    }

    #[test]
    fn decodes_c_addi() {
        // c.addi x5, 3: quadrant 01, funct3 000, rd=5, imm=3
        let half: u16 = 0b000_0_00101_00011_01;
        match decode16(half, true) {
            Inst::AluImm { op: AluOp::Add, rd: 5, rs1: 5, imm: 3, word: false } => {}
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn decodes_c_lwsp() {
        // c.lwsp x5, 16(sp): quadrant 10, funct3 010, rd=5, imm=16
        // imm[7:6|4:2|5] -> offset 16 = 0b01_0000 -> bit4=1 others 0
        let bit5 = 0u16;
        let bit4_2 = 0b100u16;
        let bit7_6 = 0b00u16;
        let half = 0b010u16 << 13 | bit5 << 12 | 5 << 7 | bit4_2 << 4 | bit7_6 << 2 | 0b10;
        match decode16(half, true) {
            Inst::Load { op: LoadOp::Lw, rd: 5, rs1: 2, imm: 16 } => {}
            other => panic!("unexpected decode: {other:?}"),
        }
    }
}
