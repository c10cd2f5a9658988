//! Reproduction: viability checks, offspring mutation, fitness-based
//! revert/sterilize and hand-off to the host.

use crate::config::{AppConfig, DivideConfig, DivideMethod, MutationConfig, RevertConfig};
use crate::hardware::{HeadsCpu, SPACE_OFFSPRING};
use crate::inst_set::InstSet;
use crate::interface::{Environment, ExecContext, OrganismInterface};
use crate::mutation::{self, MutationKind, MutationRecord};
use crate::organism::OrganismState;
use crate::phenotype::Phenotype;
use crate::test_cpu::TestCpu;
use rand::{Rng, RngCore};
use replicon_data::{GenomeBuffer, Sequence, SiteFlags};
use std::sync::Arc;
use thiserror::Error;

/// Why a divide attempt failed. Faults are organism-local: they are counted
/// on the phenotype and the parent keeps running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DivideFault {
    #[error("no offspring memory allocated")]
    NoAllocation,
    #[error("write head is not in offspring memory")]
    WriteHeadOutside,
    #[error("offspring of {len} sites is below the minimum of {min}")]
    ChildTooSmall { len: usize, min: usize },
    #[error("offspring of {len} sites exceeds the maximum of {max}")]
    ChildTooLarge { len: usize, max: usize },
    #[error("offspring length {child} is out of range for parent length {parent}")]
    SizeRange { child: usize, parent: usize },
    #[error("only {copied} sites copied, {required} required")]
    TooFewCopied { copied: usize, required: usize },
    #[error("only {executed} sites executed, {required} required")]
    TooFewExecuted { executed: usize, required: usize },
    #[error("required task {0} not performed")]
    MissingTask(usize),
    #[error("bonus {bonus} below required {required}")]
    InsufficientBonus { bonus: f64, required: f64 },
    #[error("required reaction {0} not triggered")]
    MissingReaction(usize),
    #[error("no reaction triggered")]
    NoReaction,
    #[error("stored resource {stored} below required {required}")]
    InsufficientResource { stored: f64, required: f64 },
    #[error("organism is not fertile")]
    Infertile,
    #[error("offspring sterilized by fitness test")]
    Sterilized,
    #[error("host refused the offspring")]
    Refused,
}

/// Outcome of comparing an offspring against its parent on the test CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitnessVerdict {
    Keep,
    /// Replace the offspring with an exact copy of the parent.
    Revert,
    /// Abort the divide.
    Sterilize,
}

/// Checks every precondition for releasing `child`, in order, stopping at
/// the first failure. Size, copy and execution checks come first, then the
/// phenotype requirements. The required resource is consumed only when
/// every check passes.
pub fn check_viable(
    phenotype: &mut Phenotype,
    parent_len: usize,
    child: &GenomeBuffer,
    executed: usize,
    config: &DivideConfig,
) -> Result<(), DivideFault> {
    let len = child.len();
    if len < config.min_genome_size {
        return Err(DivideFault::ChildTooSmall {
            len,
            min: config.min_genome_size,
        });
    }
    if len > config.max_genome_size {
        return Err(DivideFault::ChildTooLarge {
            len,
            max: config.max_genome_size,
        });
    }
    let ratio = len as f64 / parent_len.max(1) as f64;
    let range = config.offspring_size_range;
    if ratio > range || ratio < 1.0 / range {
        return Err(DivideFault::SizeRange {
            child: len,
            parent: parent_len,
        });
    }

    let copied = child.count_flag(SiteFlags::COPIED);
    let required = (len as f64 * config.min_copied_fraction).ceil() as usize;
    if copied < required {
        return Err(DivideFault::TooFewCopied { copied, required });
    }
    let required = (parent_len as f64 * config.min_executed_fraction).ceil() as usize;
    if executed < required {
        return Err(DivideFault::TooFewExecuted { executed, required });
    }

    if let Some(task) = config.required_task {
        let performed = |t: usize| phenotype.cur_task_count.get(t).is_some_and(|&c| c > 0);
        let immune = config.immunity_task.is_some_and(performed);
        if !immune && !performed(task) {
            return Err(DivideFault::MissingTask(task));
        }
    }
    if phenotype.cur_bonus < config.required_bonus {
        return Err(DivideFault::InsufficientBonus {
            bonus: phenotype.cur_bonus,
            required: config.required_bonus,
        });
    }
    if let Some(reaction) = config.required_reaction {
        if phenotype
            .cur_reaction_count
            .get(reaction)
            .map_or(true, |&c| c == 0)
        {
            return Err(DivideFault::MissingReaction(reaction));
        }
    }
    if config.require_any_reaction && !phenotype.any_reaction() {
        return Err(DivideFault::NoReaction);
    }
    if let Some(resource) = config.required_resource {
        let stored = phenotype.stored_resource(resource);
        if stored < config.required_resource_level {
            return Err(DivideFault::InsufficientResource {
                stored,
                required: config.required_resource_level,
            });
        }
    }
    if !phenotype.is_fertile {
        return Err(DivideFault::Infertile);
    }

    if let Some(resource) = config.required_resource {
        phenotype.add_resource(resource, -config.required_resource_level);
    }
    Ok(())
}

fn fires<R: Rng + ?Sized>(rate: f64, rng: &mut R) -> bool {
    rate > 0.0 && rng.gen_bool(rate.min(1.0))
}

/// Applies the divide-time operators in `config.divide_order`, with every
/// rate scaled by `multiplier`. Returns the number of mutations applied.
pub fn do_mutations<R: Rng>(
    child: &mut GenomeBuffer,
    config: &MutationConfig,
    multiplier: f64,
    write_pos: Option<usize>,
    inst_set: &InstSet,
    interface: &mut dyn OrganismInterface,
    rng: &mut R,
) -> usize {
    let mut records: Vec<MutationRecord> = Vec::new();
    for &kind in &config.divide_order {
        match kind {
            MutationKind::Substitution => {
                if fires(config.divide_mut_prob * multiplier, rng) && !child.is_empty() {
                    let site = rng.gen_range(0..child.len());
                    let inst = inst_set.random_inst_excluding(child.inst(site), rng);
                    records.push(mutation::point_mutate_site(child, site, inst, kind));
                }
            }
            MutationKind::Insertion => {
                if fires(config.divide_ins_prob * multiplier, rng) {
                    records.push(mutation::insertion_mutation(child, kind, inst_set, rng));
                }
            }
            MutationKind::Deletion => {
                if fires(config.divide_del_prob * multiplier, rng) {
                    records.extend(mutation::deletion_mutation(child, kind, rng));
                }
            }
            MutationKind::Uniform => {
                if fires(config.divide_uniform_prob * multiplier, rng) {
                    records.extend(mutation::uniform_mutation(child, inst_set, rng));
                }
            }
            MutationKind::Slip => {
                if fires(config.divide_slip_prob * multiplier, rng) {
                    records.extend(mutation::slip_mutation(
                        child,
                        config.slip_dup_prob,
                        config.slip_del_prob,
                        rng,
                    ));
                }
            }
            MutationKind::Translocation => {
                if fires(config.divide_trans_prob * multiplier, rng) {
                    records.extend(mutation::translocation_mutation(child, rng));
                }
            }
            MutationKind::SiteSubstitution => records.extend(mutation::point_mutations(
                child,
                config.divide_site_mut_prob * multiplier,
                kind,
                inst_set,
                rng,
            )),
            MutationKind::SiteInsertion => records.extend(mutation::site_insertions(
                child,
                config.divide_site_ins_prob * multiplier,
                inst_set,
                rng,
            )),
            MutationKind::SiteDeletion => records.extend(mutation::site_deletions(
                child,
                config.divide_site_del_prob * multiplier,
                rng,
            )),
            MutationKind::Point => records.extend(mutation::point_mutations(
                child,
                config.point_mut_prob * multiplier,
                kind,
                inst_set,
                rng,
            )),
            MutationKind::Hgt => {
                if fires(config.hgt_prob * multiplier, rng) {
                    let fragment = interface.donor_fragment(&mut *rng as &mut dyn RngCore);
                    if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
                        let site = match write_pos {
                            Some(pos) => pos.min(child.len()),
                            None => rng.gen_range(0..=child.len()),
                        };
                        records.push(mutation::hgt_mutation(child, site, &fragment));
                    }
                }
            }
            MutationKind::Copy
            | MutationKind::CopyInsertion
            | MutationKind::CopyDeletion
            | MutationKind::Exact => {}
        }
    }

    for record in &records {
        tracing::trace!(kind = ?record.kind, site = record.site, len = record.len, "Mutation");
    }
    records.len()
}

/// Applies exactly `count` substitutions at distinct sites.
pub fn do_exact_mutations<R: Rng + ?Sized>(
    child: &mut GenomeBuffer,
    count: usize,
    inst_set: &InstSet,
    rng: &mut R,
) -> usize {
    let records = mutation::exact_point_mutations(child, count, inst_set, rng);
    for record in &records {
        tracing::trace!(site = record.site, "Exact mutation");
    }
    records.len()
}

fn roll<R: Rng + ?Sized>(p: f64, rng: &mut R) -> bool {
    p > 0.0 && rng.gen_bool(p.min(1.0))
}

/// Test-runs parent and offspring and applies the revert/sterilize policy.
/// Nothing is run and no randomness is drawn unless some policy is enabled.
pub fn test_fitness_measures<R: Rng + ?Sized>(
    parent: &Sequence,
    child: &Sequence,
    config: &AppConfig,
    inst_set: &Arc<InstSet>,
    env: Option<&dyn Environment>,
    rng: &mut R,
) -> FitnessVerdict {
    let policy: &RevertConfig = &config.revert;
    if !policy.is_enabled() {
        return FitnessVerdict::Keep;
    }

    let test_cpu = TestCpu::new(Arc::clone(inst_set), config, env);
    let parent_info = test_cpu.evaluate(parent);
    let child_info = test_cpu.evaluate(child);

    let parent_fitness = parent_info.fitness;
    let child_fitness = if child_info.viable {
        child_info.fitness
    } else {
        0.0
    };

    let (mut revert, mut sterilize) = (false, false);
    if child_fitness == 0.0 {
        revert |= roll(policy.revert_fatal, rng);
        sterilize |= roll(policy.sterilize_fatal, rng);
    } else if parent_fitness <= 0.0 {
        revert |= roll(policy.revert_beneficial, rng);
        sterilize |= roll(policy.sterilize_beneficial, rng);
    } else {
        let ratio = child_fitness / parent_fitness;
        if ratio < 1.0 - policy.neutral_tolerance {
            revert |= roll(policy.revert_detrimental, rng);
            sterilize |= roll(policy.sterilize_detrimental, rng);
        } else if ratio > 1.0 + policy.neutral_tolerance {
            revert |= roll(policy.revert_beneficial, rng);
            sterilize |= roll(policy.sterilize_beneficial, rng);
        } else {
            revert |= roll(policy.revert_neutral, rng);
            sterilize |= roll(policy.sterilize_neutral, rng);
        }
    }

    let task_loss = parent_info
        .task_counts
        .iter()
        .zip(&child_info.task_counts)
        .any(|(&p, &c)| p > 0 && c == 0);
    if task_loss {
        revert |= roll(policy.revert_taskloss, rng);
        sterilize |= roll(policy.sterilize_taskloss, rng);
    }
    if parent == child {
        revert |= roll(policy.revert_equals, rng);
    }

    if sterilize {
        FitnessVerdict::Sterilize
    } else if revert {
        FitnessVerdict::Revert
    } else {
        FitnessVerdict::Keep
    }
}

/// Credits on-divide tasks, closes the parent's gestation and offers the
/// offspring to the host. On refusal the phenotype is restored.
pub fn activate_divide<R: Rng>(
    state: &mut OrganismState,
    child: &Sequence,
    parent_len: usize,
    copied: usize,
    executed: usize,
    ctx: &mut ExecContext<'_, R>,
) -> Result<(), DivideFault> {
    let before = state.phenotype.clone();
    let outcome = ctx
        .interface
        .test_on_divide(&state.phenotype.cur_task_count);
    state.phenotype.apply_outcome(&outcome);
    state.phenotype.divide_reset(parent_len, copied, executed);

    if !ctx.interface.divide(state.id, &state.phenotype, child) {
        state.phenotype = before;
        return Err(DivideFault::Refused);
    }
    Ok(())
}

fn record<T>(state: &mut OrganismState, result: Result<T, DivideFault>) -> Result<T, DivideFault> {
    if let Err(fault) = &result {
        tracing::debug!(organism = state.id, %fault, "Divide failed");
        state.phenotype.record_fault(fault.clone());
    }
    result
}

/// `h-divide`: the offspring is the offspring space up to the write head.
pub fn divide_heads<R: Rng>(
    cpu: &mut HeadsCpu,
    state: &mut OrganismState,
    ctx: &mut ExecContext<'_, R>,
) -> Result<(), DivideFault> {
    let result = divide_heads_inner(cpu, state, ctx);
    record(state, result)
}

fn divide_heads_inner<R: Rng>(
    cpu: &mut HeadsCpu,
    state: &mut OrganismState,
    ctx: &mut ExecContext<'_, R>,
) -> Result<(), DivideFault> {
    if !cpu.mal_active() {
        return Err(DivideFault::NoAllocation);
    }
    let write = cpu.write_head();
    if write.space() != SPACE_OFFSPRING {
        return Err(DivideFault::WriteHeadOutside);
    }
    let child = cpu.offspring().extract(0, write.position());
    let executed = cpu.genome().count_flag(SiteFlags::EXECUTED);
    let parent_len = cpu.genome().len();
    check_viable(
        &mut state.phenotype,
        parent_len,
        &child,
        executed,
        &ctx.config.divide,
    )?;
    finish_divide(cpu, state, child, executed, Some(write.position()), ctx)
}

/// Whole-genome self-copy triggered by the implicit reproduction settings.
/// Each site is copied with copy mutation.
pub fn implicit_repro<R: Rng>(
    cpu: &mut HeadsCpu,
    state: &mut OrganismState,
    ctx: &mut ExecContext<'_, R>,
) -> Result<(), DivideFault> {
    let result = implicit_repro_inner(cpu, state, ctx);
    record(state, result)
}

fn implicit_repro_inner<R: Rng>(
    cpu: &mut HeadsCpu,
    state: &mut OrganismState,
    ctx: &mut ExecContext<'_, R>,
) -> Result<(), DivideFault> {
    let parent = cpu.genome();
    let parent_len = parent.len();
    let executed = parent.count_flag(SiteFlags::EXECUTED);
    let rate = ctx.config.mutation.copy_mut_prob;

    let mut child = GenomeBuffer::with_len(parent_len);
    for site in 0..parent_len {
        let inst = parent.inst(site);
        match mutation::copy_mutation(inst, rate, cpu.inst_set(), ctx.rng) {
            Some(mutated) => {
                child.write_copied(site, mutated);
                child.set_flag(site, SiteFlags::COPY_MUTATED | SiteFlags::MUTATED);
            }
            None => child.write_copied(site, inst),
        }
    }

    check_viable(
        &mut state.phenotype,
        parent_len,
        &child,
        executed,
        &ctx.config.divide,
    )?;
    finish_divide(cpu, state, child, executed, None, ctx)
}

fn finish_divide<R: Rng>(
    cpu: &mut HeadsCpu,
    state: &mut OrganismState,
    mut child: GenomeBuffer,
    executed: usize,
    write_pos: Option<usize>,
    ctx: &mut ExecContext<'_, R>,
) -> Result<(), DivideFault> {
    let config = ctx.config;
    let inst_set = Arc::clone(cpu.inst_set());
    let copied = child.count_flag(SiteFlags::COPIED);
    let parent_len = cpu.genome().len();

    let mutations = if config.mutation.exact_mutations > 0 {
        do_exact_mutations(&mut child, config.mutation.exact_mutations, &inst_set, ctx.rng)
    } else {
        do_mutations(
            &mut child,
            &config.mutation,
            1.0,
            write_pos,
            &inst_set,
            ctx.interface,
            ctx.rng,
        )
    };

    let parent_seq = cpu.genome().sequence().clone();
    let mut child_seq = child.into_sequence();
    let env = ctx.interface.environment();
    match test_fitness_measures(&parent_seq, &child_seq, config, &inst_set, env, ctx.rng) {
        FitnessVerdict::Sterilize => return Err(DivideFault::Sterilized),
        FitnessVerdict::Revert => {
            tracing::trace!(organism = state.id, "Offspring reverted to parent genome");
            child_seq = parent_seq.clone();
        }
        FitnessVerdict::Keep => {}
    }

    activate_divide(state, &child_seq, parent_len, copied, executed, ctx)?;
    tracing::trace!(
        organism = state.id,
        offspring_len = child_seq.len(),
        mutations,
        "Divide"
    );

    match config.cpu.divide_method {
        DivideMethod::Split => {
            state.genome = parent_seq;
            cpu.reset(config);
        }
        DivideMethod::Birth => cpu.clear_offspring(),
    }
    Ok(())
}
