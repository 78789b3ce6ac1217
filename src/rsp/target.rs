//! Operations the protocol layer can ask of whatever it is debugging.
//!
//! Every operation is optional. A `support_*` method returning `None` makes the
//! server log the verb as unsupported and send the empty reply instead.

pub trait Target {
    #[inline(always)]
    fn support_question(&mut self) -> Option<QuestionOps<'_>> {
        None
    }

    #[inline(always)]
    fn support_get_regs(&mut self) -> Option<GetRegsOps<'_>> {
        None
    }

    #[inline(always)]
    fn support_read_mem(&mut self) -> Option<ReadMemOps<'_>> {
        None
    }

    #[inline(always)]
    fn support_resume(&mut self) -> Option<ResumeOps<'_>> {
        None
    }

    #[inline(always)]
    fn support_kill(&mut self) -> Option<KillOps<'_>> {
        None
    }
}

pub type QuestionOps<'a> = &'a mut dyn Question;
pub type GetRegsOps<'a> = &'a mut dyn GetRegs;
pub type ReadMemOps<'a> = &'a mut dyn ReadMem;
pub type ResumeOps<'a> = &'a mut dyn Resume;
pub type KillOps<'a> = &'a mut dyn Kill;

/// `?`: why the target is stopped, e.g. `S05`.
pub trait Question {
    fn question(&mut self) -> String;
}

/// `g`: hex encoded register file.
pub trait GetRegs {
    fn get_regs(&mut self) -> String;
}

/// `m addr,len`: hex encoded memory, possibly shorter than requested.
pub trait ReadMem {
    fn read_mem(&mut self, addr: usize, len: usize) -> String;
}

/// `s` and `c`. Both run to completion and return the stop reply.
pub trait Resume {
    fn stepi(&mut self) -> String;
    fn cont(&mut self) -> String;
}

/// `k`: no reply is sent, the connection is closed afterwards.
pub trait Kill {
    fn kill(&mut self);
}
