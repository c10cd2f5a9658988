use super::thread::{NUM_REGISTERS, REG_AX, REG_BX, REG_CX};
use super::{HeadsCpu, StepOutcome};
use crate::divide;
use crate::head::{Head, Label, HEAD_FLOW, HEAD_IP, HEAD_READ, HEAD_WRITE};
use crate::inst_set::InstOp;
use crate::interface::{ExecContext, Message};
use crate::mutation::{self, MutationKind};
use crate::organism::OrganismState;
use rand::Rng;
use replicon_data::{Instruction, SiteFlags};

const fn next_reg(reg: usize) -> usize {
    (reg + 1) % NUM_REGISTERS
}

impl HeadsCpu {
    fn thread_mut(&mut self) -> &mut super::CpuThread {
        let cur = self.cur_thread;
        &mut self.threads[cur]
    }

    fn reg(&self, reg: usize) -> i32 {
        self.thread().regs[reg]
    }

    fn set_reg(&mut self, reg: usize, value: i32) {
        self.thread_mut().regs[reg] = value;
    }

    fn head(&self, head: usize) -> Head {
        self.thread().heads[head]
    }

    fn set_head(&mut self, head: usize, value: Head) {
        self.thread_mut().heads[head].jump(value);
    }

    fn advance_head(&mut self, head: usize, delta: i64) {
        let cur = self.cur_thread;
        self.threads[cur].heads[head].advance(delta, &self.memory);
    }

    /// If the site after the IP is a label nop, consumes it and returns its
    /// value; otherwise returns `default`.
    fn find_modifier(&mut self, default: usize) -> usize {
        let mut next = self.head(HEAD_IP);
        next.advance(1, &self.memory);
        match self.inst_set.nop_mod(next.inst(&self.memory)) {
            Some(value) => {
                next.mark_executed(&mut self.memory);
                self.set_head(HEAD_IP, next);
                value
            }
            None => default,
        }
    }

    /// Reads the label following the IP into `next_label`, moving the IP
    /// onto its last nop.
    fn read_label(&mut self, max_size: usize) -> Label {
        let ip = self.head(HEAD_IP);
        let (label, consumed) = Label::read_after(&ip, &self.memory, &self.inst_set, max_size);
        for _ in 0..consumed {
            self.advance_head(HEAD_IP, 1);
            let ip = self.head(HEAD_IP);
            ip.mark_executed(&mut self.memory);
        }
        self.thread_mut().next_label = label.clone();
        label
    }

    /// Skips the instruction after the IP.
    fn skip_next(&mut self) {
        self.advance_head(HEAD_IP, 1);
    }

    fn stack_push(&mut self, value: i32) {
        if self.thread().cur_stack == 0 {
            self.thread_mut().stack.push(value);
        } else {
            self.global_stack.push(value);
        }
    }

    fn stack_pop(&mut self) -> i32 {
        if self.thread().cur_stack == 0 {
            self.thread_mut().stack.pop()
        } else {
            self.global_stack.pop()
        }
    }

    /// Dispatches one instruction. Handlers that move the IP themselves
    /// clear `advance_ip`.
    pub(super) fn execute<R: Rng>(
        &mut self,
        op: InstOp,
        state: &mut OrganismState,
        ctx: &mut ExecContext<'_, R>,
    ) -> StepOutcome {
        let config = ctx.config;
        match op {
            InstOp::NopA | InstOp::NopB | InstOp::NopC | InstOp::NopX => {}

            InstOp::IfNEqu | InstOp::IfEqu | InstOp::IfLess | InstOp::IfGrt => {
                let op1 = self.find_modifier(REG_BX);
                let (a, b) = (self.reg(op1), self.reg(next_reg(op1)));
                let holds = match op {
                    InstOp::IfNEqu => a != b,
                    InstOp::IfEqu => a == b,
                    InstOp::IfLess => a < b,
                    _ => a > b,
                };
                if !holds {
                    self.skip_next();
                }
            }
            InstOp::IfBit1 => {
                let reg = self.find_modifier(REG_BX);
                if self.reg(reg) & 1 == 0 {
                    self.skip_next();
                }
            }
            InstOp::IfLabel => {
                let label = self.read_label(config.cpu.max_label_size).complement();
                if label != self.thread().read_label {
                    self.skip_next();
                }
            }

            InstOp::MovHead => {
                let head = self.find_modifier(HEAD_IP);
                let flow = self.head(HEAD_FLOW);
                self.set_head(head, flow);
                if head == HEAD_IP {
                    self.advance_ip = false;
                }
            }
            InstOp::JmpHead => {
                let head = self.find_modifier(HEAD_IP);
                let delta = i64::from(self.reg(REG_CX));
                self.advance_head(head, delta);
            }
            InstOp::GetHead => {
                let head = self.find_modifier(HEAD_IP);
                let pos = self.head(head).position() as i32;
                self.set_reg(REG_CX, pos);
            }
            InstOp::SetFlow => {
                let reg = self.find_modifier(REG_CX);
                let mut flow = Head::new(self.head(HEAD_IP).space(), 0);
                flow.set_position(i64::from(self.reg(reg)), &self.memory);
                self.set_head(HEAD_FLOW, flow);
            }

            InstOp::ShiftR => {
                let reg = self.find_modifier(REG_BX);
                self.set_reg(reg, self.reg(reg) >> 1);
            }
            InstOp::ShiftL => {
                let reg = self.find_modifier(REG_BX);
                self.set_reg(reg, self.reg(reg).wrapping_shl(1));
            }
            InstOp::Inc => {
                let reg = self.find_modifier(REG_BX);
                self.set_reg(reg, self.reg(reg).wrapping_add(1));
            }
            InstOp::Dec => {
                let reg = self.find_modifier(REG_BX);
                self.set_reg(reg, self.reg(reg).wrapping_sub(1));
            }
            InstOp::Zero => {
                let reg = self.find_modifier(REG_BX);
                self.set_reg(reg, 0);
            }

            InstOp::Push => {
                let reg = self.find_modifier(REG_BX);
                self.stack_push(self.reg(reg));
            }
            InstOp::Pop => {
                let reg = self.find_modifier(REG_BX);
                let value = self.stack_pop();
                self.set_reg(reg, value);
            }
            InstOp::SwapStk => {
                let thread = self.thread_mut();
                thread.cur_stack ^= 1;
            }
            InstOp::Swap => {
                let op1 = self.find_modifier(REG_BX);
                let op2 = next_reg(op1);
                self.thread_mut().regs.swap(op1, op2);
            }

            InstOp::Add | InstOp::Sub | InstOp::Nand => {
                let dst = self.find_modifier(REG_BX);
                let (b, c) = (self.reg(REG_BX), self.reg(REG_CX));
                let value = match op {
                    InstOp::Add => b.wrapping_add(c),
                    InstOp::Sub => b.wrapping_sub(c),
                    _ => !(b & c),
                };
                self.set_reg(dst, value);
            }

            InstOp::IO => {
                let reg = self.find_modifier(REG_BX);
                let output = self.reg(reg);
                let outcome = ctx.interface.test_output(
                    &state.inputs,
                    output,
                    &state.phenotype.cur_task_count,
                );
                state.phenotype.apply_outcome(&outcome);
                let input = ctx.interface.input();
                state.push_input(input, config.cpu.input_buffer_size);
                self.set_reg(reg, input);
            }

            InstOp::HAlloc => {
                if let Some(size) = self.allocate(
                    config.cpu.offspring_alloc_ratio,
                    config.divide.max_genome_size,
                ) {
                    self.set_reg(REG_AX, size as i32);
                }
            }
            InstOp::HDivide => {
                if divide::divide_heads(self, state, ctx).is_ok() {
                    return StepOutcome::Divided;
                }
            }
            InstOp::HCopy => self.head_copy(ctx),
            InstOp::HSearch => {
                let label = self.read_label(config.cpu.max_label_size).complement();
                let ip = self.head(HEAD_IP);
                let found = label
                    .to_insts(&self.inst_set)
                    .and_then(|insts| ip.find_label(&insts, &self.memory));
                let mut flow = match found {
                    Some(found) => {
                        let distance = found.position() as i64 - ip.position() as i64;
                        self.set_reg(REG_BX, distance as i32);
                        self.set_reg(REG_CX, label.len() as i32);
                        found
                    }
                    None => {
                        self.set_reg(REG_BX, 0);
                        self.set_reg(REG_CX, 0);
                        ip
                    }
                };
                flow.advance(1, &self.memory);
                self.set_head(HEAD_FLOW, flow);
            }
            InstOp::HRead => {
                let reg = self.find_modifier(REG_BX);
                let value = i32::from(self.head(HEAD_READ).inst(&self.memory).op());
                self.set_reg(reg, value);
                self.advance_head(HEAD_READ, 1);
            }
            InstOp::HWrite => {
                let reg = self.find_modifier(REG_BX);
                let op = self.reg(reg).rem_euclid(self.inst_set.len() as i32) as u8;
                let write = self.head(HEAD_WRITE);
                self.memory[write.space()].write_copied(write.position(), Instruction::new(op));
                self.advance_head(HEAD_WRITE, 1);
            }

            InstOp::ForkTh => {
                self.advance_head(HEAD_IP, 1);
                self.fork_thread(config.cpu.max_threads);
            }
            InstOp::KillTh => {
                self.kill_thread();
            }
            InstOp::IdTh => {
                let id = self.thread().id as i32;
                self.set_reg(REG_BX, id);
            }
            InstOp::NextTh => self.thread_next(),
            InstOp::PrevTh => self.thread_prev(),
            InstOp::SelectTh => {
                let label = self.read_label(config.cpu.max_label_size);
                let selected = if label.is_empty() {
                    u32::try_from(self.reg(REG_BX)).is_ok_and(|id| self.thread_select(id))
                } else {
                    self.thread_select_label(&label)
                };
                if !selected {
                    tracing::trace!(thread = self.thread().id, "select-th found no thread");
                }
            }
            InstOp::Return => {
                if self.thread().is_interrupt {
                    self.kill_thread();
                }
            }

            InstOp::SendMsg => {
                let message = Message {
                    sender: state.id,
                    label: self.reg(REG_BX),
                    data: self.reg(REG_CX),
                };
                ctx.interface.send_message(message);
            }
            InstOp::RetrieveMsg => {
                if let Some(message) = ctx.interface.receive_message() {
                    self.set_reg(REG_BX, message.label);
                    self.set_reg(REG_CX, message.data);
                }
            }
            InstOp::Rotate => {
                let reg = self.find_modifier(REG_BX);
                let direction = if self.reg(reg) < 0 { -1 } else { 1 };
                ctx.interface.rotate(direction);
            }
            InstOp::Move => {
                ctx.interface.move_forward();
            }
            InstOp::Collect => {
                let reg = self.find_modifier(REG_BX);
                let levels = ctx.interface.resources();
                if !levels.is_empty() {
                    let idx = self.reg(reg).rem_euclid(levels.len() as i32) as usize;
                    let amount = levels[idx] * config.cpu.collect_fraction;
                    if amount > 0.0 {
                        let mut deltas = vec![0.0; levels.len()];
                        deltas[idx] = -amount;
                        ctx.interface.update_resources(&deltas);
                        state.phenotype.add_resource(idx, amount);
                    }
                }
            }
            InstOp::JoinGroup => {
                let reg = self.find_modifier(REG_BX);
                ctx.interface.join_group(self.reg(reg));
            }
        }
        StepOutcome::Executed
    }

    /// `h-copy`: READ to WRITE with copy mutation, insertion and deletion,
    /// then both heads advance.
    fn head_copy<R: Rng>(&mut self, ctx: &mut ExecContext<'_, R>) {
        let config = ctx.config;
        let rates = &config.mutation;
        let read = self.head(HEAD_READ);
        let read_inst = read.inst(&self.memory);

        let max_label = config.cpu.max_label_size;
        match self.inst_set.nop_mod(read_inst) {
            Some(value) => self.thread_mut().read_label.push(value, max_label),
            None => self.thread_mut().read_label.clear(),
        }

        if rates.copy_del_prob > 0.0 && ctx.rng.gen_bool(rates.copy_del_prob) {
            tracing::trace!(site = read.position(), "Copy deletion");
            self.advance_head(HEAD_READ, 1);
            return;
        }

        if rates.copy_ins_prob > 0.0 && ctx.rng.gen_bool(rates.copy_ins_prob) {
            let write = self.head(HEAD_WRITE);
            let inst = self.inst_set.random_inst(ctx.rng);
            let record = mutation::insert_at(
                &mut self.memory[write.space()],
                write.position(),
                inst,
                MutationKind::CopyInsertion,
            );
            tracing::trace!(site = record.site, "Copy insertion");
            self.advance_head(HEAD_WRITE, 1);
        }

        let write = self.head(HEAD_WRITE);
        let copied = mutation::copy_mutation(read_inst, rates.copy_mut_prob, &self.inst_set, ctx.rng);
        let buf = &mut self.memory[write.space()];
        match copied {
            Some(inst) => {
                buf.write_copied(write.position(), inst);
                buf.set_flag(
                    write.position(),
                    SiteFlags::COPY_MUTATED | SiteFlags::MUTATED,
                );
                tracing::trace!(site = write.position(), "Copy mutation");
            }
            None => buf.write_copied(write.position(), read_inst),
        }

        self.advance_head(HEAD_READ, 1);
        self.advance_head(HEAD_WRITE, 1);
    }
}
